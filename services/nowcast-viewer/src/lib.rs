//! Read-only HTTP view over the nowcast artifact directory.

pub mod error;
pub mod handlers;
pub mod listing;
pub mod state;

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::{ViewerError, ViewerResult};
pub use state::ViewerState;

pub fn create_router(state: Arc<ViewerState>) -> Router {
    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/last_forecast", get(handlers::last_forecast_handler))
        .route("/last_gif", get(handlers::last_gif_handler))
        .route("/last_error", get(handlers::last_error_handler))
        .route("/view_gif/:name", get(handlers::view_gif_handler))
        .route("/view_image/:name", get(handlers::view_image_handler))
        .route("/artifacts/:run/:name", get(handlers::artifact_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
