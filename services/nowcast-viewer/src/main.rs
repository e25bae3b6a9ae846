//! Nowcast artifact viewer.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nowcast_common::NowcastConfig;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use nowcast_viewer::{create_router, ViewerState};

#[derive(Parser, Debug)]
#[command(name = "nowcast-viewer")]
#[command(about = "HTTP view over nowcast run artifacts")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8090", env = "VIEWER_LISTEN_ADDR")]
    listen: String,

    /// Configuration file path; only the `output` section is used
    #[arg(short, long, env = "NOWCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Artifact directory, overriding the configuration
    #[arg(long, env = "NOWCAST_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
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
        .with_level(true)
        .json()
        .init();

    let mut config = match &args.config {
        Some(path) => NowcastConfig::from_yaml(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => NowcastConfig::from_env().context("loading config from environment")?,
    };
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;
    info!("Prometheus metrics exporter initialized");

    let state = Arc::new(ViewerState::from_config(&config.output).with_prometheus(prometheus_handle));
    let app = create_router(state);

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", args.listen))?;
    info!(%addr, output_dir = %config.output.dir.display(), "Nowcast viewer listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
