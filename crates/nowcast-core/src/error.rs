//! Error types for a nowcast run.

use std::path::PathBuf;

use nowcast_common::{ConfigError, GridShape, LockError};
use radar_archive::ArchiveError;
use thiserror::Error;

/// Result type for nowcast operations.
pub type NowcastResult<T> = Result<T, NowcastError>;

/// Terminal state a failed run ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureState {
    MissingData,
    ShapeMismatch,
    InferenceFailure,
    /// Not a pipeline state: configuration, decoding or artifact I/O.
    Other,
}

impl FailureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureState::MissingData => "missing_data",
            FailureState::ShapeMismatch => "shape_mismatch",
            FailureState::InferenceFailure => "inference_failure",
            FailureState::Other => "error",
        }
    }
}

/// Errors that abort a nowcast run.
#[derive(Error, Debug)]
pub enum NowcastError {
    /// One or more frame files required by the temporal window are absent.
    #[error("missing {} radar frame(s): {}", missing.len(), display_paths(missing))]
    MissingData { missing: Vec<PathBuf> },

    /// Decoded frames, masks or model outputs disagree in shape.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// The forecasting capability failed or returned malformed output.
    #[error("inference failed: {0}")]
    Inference(String),

    /// A frame file exists but could not be read or decoded.
    #[error("failed to read frame {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("artifact lock: {0}")]
    Lock(#[from] LockError),

    /// Artifact writing failed.
    #[error("render failed: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NowcastError {
    pub fn shape_mismatch(
        context: impl Into<String>,
        expected: GridShape,
        actual: GridShape,
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Which terminal state of the run this error corresponds to.
    pub fn failure_state(&self) -> FailureState {
        match self {
            NowcastError::MissingData { .. } => FailureState::MissingData,
            NowcastError::ShapeMismatch { .. } => FailureState::ShapeMismatch,
            NowcastError::Inference(_) => FailureState::InferenceFailure,
            _ => FailureState::Other,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
