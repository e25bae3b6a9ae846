//! Radar nowcast runner.
//!
//! Runs one forecast for "now" (or `--time`), a validation run against
//! archived observations, or a loop that fires once per alignment interval.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use metrics::gauge;
use nowcast_common::{align_down, run_time_for, NowcastConfig, RunKind};
use nowcast_core::{build_forecaster, run_once, ArrayArtifactWriter, Forecaster, RunReport};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "nowcaster")]
#[command(about = "Radar precipitation nowcast runner")]
struct Args {
    /// Configuration file path (defaults plus NOWCAST_* overrides when absent)
    #[arg(short, long, env = "NOWCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Reference time (RFC 3339). Defaults to now minus the configured latency
    #[arg(short, long)]
    time: Option<DateTime<Utc>>,

    /// Validation run: forecast in the past and score against observations
    #[arg(long)]
    validation: bool,

    /// Keep running, once per alignment interval
    #[arg(long = "loop")]
    run_loop: bool,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Port for the Prometheus endpoint in loop mode
    #[arg(long, default_value = "9102", env = "NOWCAST_METRICS_PORT")]
    metrics_port: u16,
}

/// Everything a run needs, shared with the blocking worker.
struct Runner {
    config: NowcastConfig,
    forecaster: Box<dyn Forecaster>,
    writer: ArrayArtifactWriter,
}

impl Runner {
    fn run(&self, run_time: DateTime<Utc>, kind: RunKind) -> nowcast_core::NowcastResult<RunReport> {
        run_once(&self.config, self.forecaster.as_ref(), &self.writer, run_time, kind)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    let config = match &args.config {
        Some(path) => NowcastConfig::from_yaml(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => NowcastConfig::from_env().context("loading config from environment")?,
    };

    info!(
        grid = %config.grid,
        model_input = %config.model_input,
        archive = %config.archive.root.display(),
        output = %config.output.dir.display(),
        forecaster = ?config.forecaster.kind,
        "Starting nowcaster"
    );

    let runner = Arc::new(Runner {
        forecaster: build_forecaster(&config.forecaster),
        writer: ArrayArtifactWriter::from_config(&config.output),
        config,
    });

    if args.run_loop {
        let addr = SocketAddr::from(([0, 0, 0, 0], args.metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!(%addr, "Prometheus metrics exporter initialized");

        return run_forever(runner, args.validation).await;
    }

    let kind = if args.validation {
        RunKind::Validation
    } else {
        RunKind::Forecast
    };
    let run_time = args
        .time
        .unwrap_or_else(|| run_time_for(Utc::now(), &runner.config, kind));

    let report = spawn_run(runner, run_time, kind)
        .await
        .with_context(|| format!("{:?} run for {}", kind, run_time))?;
    log_report(&report);
    Ok(())
}

async fn spawn_run(
    runner: Arc<Runner>,
    run_time: DateTime<Utc>,
    kind: RunKind,
) -> Result<RunReport> {
    let report = tokio::task::spawn_blocking(move || runner.run(run_time, kind))
        .await
        .context("nowcast worker panicked")??;
    Ok(report)
}

/// Fire a forecast run (and optionally a validation run) on every alignment
/// boundary until interrupted. Failed runs are logged and skipped.
async fn run_forever(runner: Arc<Runner>, with_validation: bool) -> Result<()> {
    let interval = runner.config.alignment_minutes;
    info!(interval_minutes = interval, with_validation, "Starting scheduled runs");

    loop {
        let wait = until_next_boundary(Utc::now(), interval);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                return Ok(());
            }
        }

        let now = Utc::now();
        let mut kinds = vec![RunKind::Forecast];
        if with_validation {
            kinds.push(RunKind::Validation);
        }

        for kind in kinds {
            let run_time = run_time_for(now, &runner.config, kind);
            match spawn_run(runner.clone(), run_time, kind).await {
                Ok(report) => {
                    gauge!("nowcast_last_success_timestamp_seconds", "kind" => kind_label(kind))
                        .set(report.run_time.timestamp() as f64);
                    log_report(&report);
                }
                Err(e) => {
                    error!(%run_time, ?kind, error = %format!("{:#}", e), "Scheduled run failed");
                }
            }
        }
    }
}

fn kind_label(kind: RunKind) -> &'static str {
    match kind {
        RunKind::Forecast => "forecast",
        RunKind::Validation => "validation",
    }
}

fn log_report(report: &RunReport) {
    let run_dir = report
        .artifact
        .as_ref()
        .map(|a| a.run_dir.display().to_string())
        .unwrap_or_default();
    info!(
        run_id = %report.run_id,
        run_time = %report.run_time,
        kind = kind_label(report.kind),
        windows = report.windows.len(),
        steps = report.forecast.steps(),
        %run_dir,
        "Run finished"
    );
    for score in &report.scores {
        info!(
            lead_minutes = score.lead_minutes,
            mae = score.mae,
            rmse = score.rmse,
            bias = score.bias,
            valid_cells = score.valid_cells,
            "Lead time score"
        );
    }
    if report.kind == RunKind::Validation && report.scores.is_empty() {
        warn!("Validation run produced no scores");
    }
}

/// Time left until the next multiple of `minutes` past the epoch.
fn until_next_boundary(now: DateTime<Utc>, minutes: u32) -> StdDuration {
    let next = align_down(now, minutes) + Duration::minutes(i64::from(minutes.max(1)));
    (next - now).to_std().unwrap_or(StdDuration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_until_next_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 3, 30).unwrap();
        assert_eq!(until_next_boundary(now, 5), StdDuration::from_secs(90));

        let on_boundary = Utc.with_ymd_and_hms(2024, 1, 15, 12, 5, 0).unwrap();
        assert_eq!(until_next_boundary(on_boundary, 5), StdDuration::from_secs(300));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "nowcaster",
            "--config",
            "config/nowcast.yaml",
            "--time",
            "2024-01-15T12:05:00Z",
            "--validation",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("config/nowcast.yaml")));
        assert_eq!(
            args.time,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 12, 5, 0).unwrap())
        );
        assert!(args.validation);
        assert!(!args.run_loop);
    }
}
