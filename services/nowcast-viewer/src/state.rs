//! Shared viewer state and lock-guarded artifact reads.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use nowcast_common::{ArtifactLock, LockSettings, OutputConfig};
use tracing::debug;

use crate::error::{ViewerError, ViewerResult};

pub struct ViewerState {
    pub output_dir: PathBuf,
    pub lock: LockSettings,
    pub prometheus: Option<PrometheusHandle>,
}

impl ViewerState {
    pub fn new(output_dir: PathBuf, lock: LockSettings) -> Self {
        Self {
            output_dir,
            lock,
            prometheus: None,
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.dir.clone(), config.lock_settings())
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Read a file while holding the artifact lock, so a run being published
    /// is never served half-written.
    pub async fn read_locked(&self, path: &Path) -> ViewerResult<Vec<u8>> {
        let attempts = self.lock.retries.max(1);
        for attempt in 1..=attempts {
            if let Some(lock) = ArtifactLock::try_acquire(&self.lock.path)? {
                let result = tokio::fs::read(path).await;
                drop(lock);
                return result.map_err(|e| match e.kind() {
                    ErrorKind::NotFound => ViewerError::NotFound(display_name(path)),
                    _ => ViewerError::Io(e),
                });
            }

            counter!("viewer_lock_contention_total").increment(1);
            debug!(attempt, path = %path.display(), "Artifact lock busy");
            if attempt < attempts {
                tokio::time::sleep(self.lock.retry_delay).await;
            }
        }
        Err(ViewerError::LockBusy)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
