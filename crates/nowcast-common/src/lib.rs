//! Common types and utilities shared across all radar-nowcast crates and services.

pub mod config;
pub mod error;
pub mod lock;
pub mod time;

pub use config::{
    ArchiveConfig, DecodeConfig, ForecasterConfig, ForecasterKind, FrameFormat, GridShape,
    MaskRule, MaskSource, NowcastConfig, OutputConfig, Sentinel,
};
pub use error::{ConfigError, ConfigResult};
pub use lock::{ArtifactLock, LockError, LockSettings};
pub use time::{align_down, run_label, run_time_for, RunKind};
