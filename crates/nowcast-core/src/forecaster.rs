//! The forecasting capability and its implementations.
//!
//! A forecaster receives `H` conditioning frames for one window and returns
//! `P` frames of the same spatial shape. It is called once per window and
//! draws a single deterministic sample.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nowcast_common::{ForecasterConfig, ForecasterKind, GridShape};
use radar_archive::{read_npy, write_npy_f32, RawArray};
use tracing::{debug, info, warn};

use crate::error::{NowcastError, NowcastResult};
use crate::types::{FrameStack, ForecastSequence};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bytes of forecaster output quoted in error messages.
const LOG_TAIL_BYTES: usize = 2048;

/// Produces `steps` future frames from a stack of conditioning frames.
pub trait Forecaster: Send + Sync {
    fn name(&self) -> &str;

    fn forecast(&self, input: &FrameStack, steps: usize) -> NowcastResult<ForecastSequence>;
}

/// Build the forecaster selected in the configuration.
pub fn build_forecaster(config: &ForecasterConfig) -> Box<dyn Forecaster> {
    match config.kind {
        ForecasterKind::Persistence => Box::new(PersistenceForecaster),
        ForecasterKind::Command => Box::new(CommandForecaster::from_config(config)),
    }
}

/// Repeats the most recent input frame for every lead time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistenceForecaster;

impl Forecaster for PersistenceForecaster {
    fn name(&self) -> &str {
        "persistence"
    }

    fn forecast(&self, input: &FrameStack, steps: usize) -> NowcastResult<ForecastSequence> {
        let last = &input.last().rates;
        ForecastSequence::new(input.shape(), vec![last.clone(); steps])
    }
}

/// Runs an external model-serving command, exchanging `.npy` files.
///
/// The input file holds `(H, rows, cols, 1)` float32 rates. The command must
/// write `(P, rows, cols)` (optionally with unit leading/trailing axes) or
/// `(H + P, rows, cols)` to the output path.
#[derive(Debug, Clone)]
pub struct CommandForecaster {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl CommandForecaster {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
        working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            working_dir,
        }
    }

    pub fn from_config(config: &ForecasterConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
            config.working_dir.clone(),
        )
    }

    fn run(&self, args: &[String], log_path: &Path) -> NowcastResult<()> {
        let log = File::create(log_path)?;
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(program = %self.program, ?args, "Starting forecaster command");
        let mut child = command.spawn().map_err(|e| {
            NowcastError::Inference(format!("failed to start {}: {}", self.program, e))
        })?;

        let status = wait_with_timeout(&mut child, self.timeout)?;
        if !status.success() {
            return Err(NowcastError::Inference(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                log_tail(log_path)
            )));
        }
        Ok(())
    }
}

impl Forecaster for CommandForecaster {
    fn name(&self) -> &str {
        &self.program
    }

    fn forecast(&self, input: &FrameStack, steps: usize) -> NowcastResult<ForecastSequence> {
        let scratch = tempfile::Builder::new()
            .prefix("nowcast_infer_")
            .tempdir()?;
        let input_path = scratch.path().join("input.npy");
        let output_path = scratch.path().join("output.npy");
        let log_path = scratch.path().join("forecaster.log");

        let shape = input.shape();
        write_npy_f32(
            &input_path,
            &[input.len(), shape.rows, shape.cols, 1],
            &input.to_tensor(),
        )
        .map_err(|e| NowcastError::Inference(format!("failed to write model input: {}", e)))?;

        let run_time = input.last().timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input_path.to_string_lossy())
                    .replace("{output}", &output_path.to_string_lossy())
                    .replace("{run_time}", &run_time)
            })
            .collect();

        let started = Instant::now();
        self.run(&args, &log_path)?;

        let raw = read_npy(&output_path).map_err(|e| {
            NowcastError::Inference(format!(
                "unreadable model output {}: {}",
                output_path.display(),
                e
            ))
        })?;
        let sequence = interpret_output(raw, input.len(), steps, shape)?;

        info!(
            program = %self.program,
            window = %shape,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Forecaster command finished"
        );
        Ok(sequence)
    }
}

/// Turn a model output array into a `steps`-long sequence of `shape` frames.
///
/// Unit leading/trailing axes are dropped, `H + P` outputs lose their first
/// `history` frames, and negative rates are clamped to zero.
pub fn interpret_output(
    raw: RawArray,
    history: usize,
    steps: usize,
    shape: GridShape,
) -> NowcastResult<ForecastSequence> {
    let mut dims: &[usize] = &raw.shape;
    while dims.len() > 3 && dims[dims.len() - 1] == 1 {
        dims = &dims[..dims.len() - 1];
    }
    while dims.len() > 3 && dims[0] == 1 {
        dims = &dims[1..];
    }
    let (frames, rows, cols) = match dims {
        [frames, rows, cols] => (*frames, *rows, *cols),
        _ => {
            return Err(NowcastError::Inference(format!(
                "model output has shape {:?}, expected (frames, rows, cols)",
                raw.shape
            )))
        }
    };

    let actual = GridShape::new(rows, cols);
    if actual != shape {
        return Err(NowcastError::shape_mismatch("forecaster output", shape, actual));
    }

    let skip = if frames == steps {
        0
    } else if frames == history + steps {
        history
    } else {
        return Err(NowcastError::Inference(format!(
            "model returned {} frames, expected {} or {}",
            frames,
            steps,
            history + steps
        )));
    };

    let mut data = raw.data;
    data.drain(..skip * shape.len());
    if data.iter().any(|v| v.is_nan()) {
        return Err(NowcastError::Inference("model output contains NaN".to_string()));
    }
    for v in data.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }

    ForecastSequence::from_tensor(shape, steps, data)
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> NowcastResult<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                warn!(error = %e, "Failed to kill timed-out forecaster");
            }
            let _ = child.wait();
            return Err(NowcastError::Inference(format!(
                "forecaster timed out after {}s",
                timeout.as_secs_f32()
            )));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn log_tail(path: &Path) -> String {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| trimmed.len() - i <= LOG_TAIL_BYTES)
        .unwrap_or(0);
    trimmed[start..].to_string()
}
