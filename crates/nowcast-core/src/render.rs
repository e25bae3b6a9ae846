//! Rendering hand-off: what a finished run passes to its artifact writer.
//!
//! The bundled [`ArrayArtifactWriter`] lays each run out as
//!
//! ```text
//! {output_dir}/
//!   2024-01-15_12h05/
//!     forecast.npy        (P, rows, cols) float32, NaN = no data
//!     observation.npy     validation runs only
//!     manifest.json
//!   last_forecast.npy     copies of the newest run, refreshed under the lock
//!   last_manifest.json
//!   last_observation.npy  only when the newest run had observations
//!   last_error.json       newest validation run's scores
//!   lock_file.txt         present while a writer or reader holds the lock
//! ```
//!
//! Plots and animations are produced by external tools from these arrays.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nowcast_common::{run_label, ArtifactLock, GridShape, LockSettings, OutputConfig, RunKind};
use radar_archive::write_npy_f32;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{NowcastError, NowcastResult};
use crate::tiling::WindowSpec;
use crate::types::ForecastSequence;
use crate::verification::LeadTimeScore;

pub const FORECAST_FILE: &str = "forecast.npy";
pub const OBSERVATION_FILE: &str = "observation.npy";
pub const MANIFEST_FILE: &str = "manifest.json";

pub const LAST_FORECAST: &str = "last_forecast.npy";
pub const LAST_OBSERVATION: &str = "last_observation.npy";
pub const LAST_MANIFEST: &str = "last_manifest.json";
pub const LAST_ERROR: &str = "last_error.json";

/// Everything a renderer receives for one successful run.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub run_id: Uuid,
    pub run_time: DateTime<Utc>,
    pub kind: RunKind,
    pub step_minutes: u32,
    pub forecast: &'a ForecastSequence,
    pub observed: Option<&'a ForecastSequence>,
    pub scores: &'a [LeadTimeScore],
    pub windows: &'a [WindowSpec],
}

/// Files produced for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub run_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Consumes a full-grid, masked forecast.
pub trait Renderer: Send + Sync {
    fn render(&self, request: &RenderRequest<'_>) -> NowcastResult<RenderedArtifact>;
}

/// Run description stored next to the arrays.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub run_id: String,
    pub run_time: DateTime<Utc>,
    pub kind: RunKind,
    pub shape: GridShape,
    pub steps: usize,
    pub lead_times_minutes: Vec<u32>,
    pub windows: Vec<WindowSpec>,
    pub scores: Vec<LeadTimeScore>,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    fn from_request(request: &RenderRequest<'_>) -> Self {
        Self {
            run_id: request.run_id.to_string(),
            run_time: request.run_time,
            kind: request.kind,
            shape: request.forecast.shape(),
            steps: request.forecast.steps(),
            lead_times_minutes: (1..=request.forecast.steps() as u32)
                .map(|i| i * request.step_minutes)
                .collect(),
            windows: request.windows.to_vec(),
            scores: request.scores.to_vec(),
            created_at: Utc::now(),
        }
    }
}

/// Writes forecast arrays and a JSON manifest per run.
#[derive(Debug, Clone)]
pub struct ArrayArtifactWriter {
    output_dir: PathBuf,
    lock: LockSettings,
}

impl ArrayArtifactWriter {
    pub fn new(output_dir: PathBuf, lock: LockSettings) -> Self {
        Self { output_dir, lock }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.dir.clone(), config.lock_settings())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the run into a hidden staging directory.
    fn stage(&self, request: &RenderRequest<'_>, staging: &Path) -> NowcastResult<()> {
        fs::create_dir_all(staging)?;

        write_sequence(&staging.join(FORECAST_FILE), request.forecast)?;
        if let Some(observed) = request.observed {
            write_sequence(&staging.join(OBSERVATION_FILE), observed)?;
        }

        let manifest = Manifest::from_request(request);
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| NowcastError::Render(format!("manifest: {}", e)))?;
        fs::write(staging.join(MANIFEST_FILE), json)?;
        Ok(())
    }

    /// Refresh the `last_*` copies from a finished run directory.
    ///
    /// Caller holds the artifact lock.
    fn publish_latest(&self, run_dir: &Path, request: &RenderRequest<'_>) -> NowcastResult<Vec<PathBuf>> {
        let mut copies = vec![
            (FORECAST_FILE, LAST_FORECAST),
            (MANIFEST_FILE, LAST_MANIFEST),
        ];
        if request.observed.is_some() {
            copies.push((OBSERVATION_FILE, LAST_OBSERVATION));
        }

        // last_observation.npy must pair with last_forecast.npy
        if request.observed.is_none() {
            match fs::remove_file(self.output_dir.join(LAST_OBSERVATION)) {
                Ok(()) => debug!("Removed observation of an earlier run"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut written = Vec::with_capacity(copies.len() + 1);
        for (source, target) in copies {
            let dest = self.output_dir.join(target);
            fs::copy(run_dir.join(source), &dest)?;
            written.push(dest);
        }

        if request.kind == RunKind::Validation && !request.scores.is_empty() {
            let dest = self.output_dir.join(LAST_ERROR);
            let json = serde_json::to_vec_pretty(request.scores)
                .map_err(|e| NowcastError::Render(format!("scores: {}", e)))?;
            fs::write(&dest, json)?;
            written.push(dest);
        }
        Ok(written)
    }
}

impl Renderer for ArrayArtifactWriter {
    fn render(&self, request: &RenderRequest<'_>) -> NowcastResult<RenderedArtifact> {
        fs::create_dir_all(&self.output_dir)?;

        let label = run_label(request.run_time);
        let run_dir = self.output_dir.join(&label);
        let staging = self
            .output_dir
            .join(format!(".{}.partial-{}", label, request.run_id.simple()));

        let lock = match self
            .stage(request, &staging)
            .and_then(|_| ArtifactLock::acquire(&self.lock).map_err(NowcastError::from))
        {
            Ok(lock) => lock,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };
        debug!(lock = %lock.path().display(), "Holding artifact lock");

        // Re-running the same run time replaces the earlier artifacts
        if run_dir.exists() {
            fs::remove_dir_all(&run_dir)?;
        }
        fs::rename(&staging, &run_dir)?;

        let mut files = vec![run_dir.join(FORECAST_FILE), run_dir.join(MANIFEST_FILE)];
        if request.observed.is_some() {
            files.push(run_dir.join(OBSERVATION_FILE));
        }
        files.extend(self.publish_latest(&run_dir, request)?);
        drop(lock);

        info!(
            run_dir = %run_dir.display(),
            files = files.len(),
            "Wrote run artifacts"
        );
        Ok(RenderedArtifact { run_dir, files })
    }
}

fn write_sequence(path: &Path, sequence: &ForecastSequence) -> NowcastResult<()> {
    let shape = sequence.shape();
    write_npy_f32(
        path,
        &[sequence.steps(), shape.rows, shape.cols],
        &sequence.to_tensor(),
    )
    .map_err(|e| NowcastError::Render(format!("{}: {}", path.display(), e)))
}
