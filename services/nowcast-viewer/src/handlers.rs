//! HTTP handlers.
//!
//! - `GET /` - JSON listing of run directories and images, newest first
//! - `GET /last_forecast` - latest forecast (rendered PNG, else the array)
//! - `GET /last_gif` - latest forecast animation
//! - `GET /last_error` - latest validation scores (rendered PNG, else JSON)
//! - `GET /view_gif/:name`, `GET /view_image/:name` - top-level images
//! - `GET /artifacts/:run/:name` - one file of a run directory
//! - `GET /health`, `GET /metrics`

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::Serialize;

use crate::error::{ViewerError, ViewerResult};
use crate::listing::{has_extension, is_image, is_safe_name, list_artifacts, ArtifactListing};
use crate::state::ViewerState;

const LAST_FORECAST_CANDIDATES: &[&str] = &["last_forecast.png", "last_forecast.npy"];
const LAST_GIF_CANDIDATES: &[&str] = &["last_forecast.gif"];
const LAST_ERROR_CANDIDATES: &[&str] = &["last_error.png", "last_error.json"];

fn record(route: &'static str) {
    counter!("viewer_requests_total", "route" => route).increment(1);
}

fn content_type(name: &str) -> &'static str {
    let ext = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

fn checked(name: &str) -> ViewerResult<&str> {
    if is_safe_name(name) {
        Ok(name)
    } else {
        Err(ViewerError::InvalidName(name.to_string()))
    }
}

async fn serve(state: &ViewerState, path: PathBuf) -> ViewerResult<Response> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let body = state.read_locked(&path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type(&name)),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// Serve the first candidate that exists at the top of the artifact directory.
async fn serve_first(state: &ViewerState, candidates: &[&str]) -> ViewerResult<Response> {
    let found = candidates
        .iter()
        .map(|name| state.output_dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| ViewerError::NotFound(candidates.join(" or ")))?;
    serve(state, found).await
}

/// GET / - listing of runs and images
pub async fn index_handler(
    Extension(state): Extension<Arc<ViewerState>>,
) -> ViewerResult<Json<ArtifactListing>> {
    record("index");
    let dir = state.output_dir.clone();
    let lock_file = state
        .lock
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let listing = tokio::task::spawn_blocking(move || list_artifacts(&dir, &lock_file))
        .await
        .map_err(|e| ViewerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    Ok(Json(listing))
}

pub async fn last_forecast_handler(
    Extension(state): Extension<Arc<ViewerState>>,
) -> ViewerResult<Response> {
    record("last_forecast");
    serve_first(&state, LAST_FORECAST_CANDIDATES).await
}

pub async fn last_gif_handler(
    Extension(state): Extension<Arc<ViewerState>>,
) -> ViewerResult<Response> {
    record("last_gif");
    serve_first(&state, LAST_GIF_CANDIDATES).await
}

pub async fn last_error_handler(
    Extension(state): Extension<Arc<ViewerState>>,
) -> ViewerResult<Response> {
    record("last_error");
    serve_first(&state, LAST_ERROR_CANDIDATES).await
}

pub async fn view_gif_handler(
    Extension(state): Extension<Arc<ViewerState>>,
    Path(name): Path<String>,
) -> ViewerResult<Response> {
    record("view_gif");
    let name = checked(&name)?;
    if !has_extension(name, &["gif"]) {
        return Err(ViewerError::NotFound(name.to_string()));
    }
    serve(&state, state.output_dir.join(name)).await
}

pub async fn view_image_handler(
    Extension(state): Extension<Arc<ViewerState>>,
    Path(name): Path<String>,
) -> ViewerResult<Response> {
    record("view_image");
    let name = checked(&name)?;
    if !is_image(name) {
        return Err(ViewerError::NotFound(name.to_string()));
    }
    serve(&state, state.output_dir.join(name)).await
}

pub async fn artifact_handler(
    Extension(state): Extension<Arc<ViewerState>>,
    Path((run, name)): Path<(String, String)>,
) -> ViewerResult<Response> {
    record("artifacts");
    let run = checked(&run)?;
    let name = checked(&name)?;
    serve(&state, state.output_dir.join(run).join(name)).await
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn metrics_handler(Extension(state): Extension<Arc<ViewerState>>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed\n").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type("last_forecast.png"), "image/png");
        assert_eq!(content_type("anim.GIF"), "image/gif");
        assert_eq!(content_type("last_error.json"), "application/json");
        assert_eq!(content_type("forecast.npy"), "application/octet-stream");
    }
}
