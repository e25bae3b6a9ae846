//! Viewer errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nowcast_common::LockError;
use thiserror::Error;
use tracing::warn;

pub type ViewerResult<T> = Result<T, ViewerError>;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Path component that could escape the artifact directory.
    #[error("invalid artifact name: {0}")]
    InvalidName(String),

    #[error("artifacts are being written, retry later")]
    LockBusy,

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ViewerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ViewerError::NotFound(_) => StatusCode::NOT_FOUND,
            ViewerError::InvalidName(_) => StatusCode::BAD_REQUEST,
            ViewerError::LockBusy => StatusCode::SERVICE_UNAVAILABLE,
            ViewerError::Lock(_) | ViewerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ViewerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "Viewer request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
