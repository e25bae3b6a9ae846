//! Marker-file mutual exclusion for the artifact directory.
//!
//! The nowcaster writes artifacts and the viewer reads them; both hold an
//! [`ArtifactLock`] for the duration of the file operation. The lock is an
//! exclusively-created marker file, removed on drop.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Where the marker file lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    pub path: PathBuf,
    /// Total number of attempts before giving up.
    pub retries: u32,
    pub retry_delay: Duration,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("artifact lock {path} still held after {attempts} attempts")]
    Busy { path: PathBuf, attempts: u32 },

    #[error("failed to create lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A held artifact lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct ArtifactLock {
    path: PathBuf,
}

impl ArtifactLock {
    /// Try once to create the marker file.
    ///
    /// Returns `Ok(None)` if another process currently holds the lock.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                // Owner pid is informational only.
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Acquire the lock, sleeping between attempts (blocking).
    pub fn acquire(settings: &LockSettings) -> Result<Self, LockError> {
        let attempts = settings.retries.max(1);
        for attempt in 1..=attempts {
            if let Some(lock) = Self::try_acquire(&settings.path)? {
                return Ok(lock);
            }
            debug!(
                path = %settings.path.display(),
                attempt,
                "Artifact lock busy, retrying"
            );
            if attempt < attempts {
                std::thread::sleep(settings.retry_delay);
            }
        }
        Err(LockError::Busy {
            path: settings.path.clone(),
            attempts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release artifact lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path, retries: u32) -> LockSettings {
        LockSettings {
            path: dir.join("lock_file.txt"),
            retries,
            retry_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), 3);

        let lock = ArtifactLock::acquire(&settings).unwrap();
        assert!(lock.path().exists());
        drop(lock);
        assert!(!settings.path.exists());

        // Can be taken again once released
        let again = ArtifactLock::acquire(&settings).unwrap();
        drop(again);
    }

    #[test]
    fn test_lock_busy_after_bounded_retries() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), 3);

        let _held = ArtifactLock::acquire(&settings).unwrap();
        match ArtifactLock::acquire(&settings) {
            Err(LockError::Busy { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected Busy, got {:?}", other),
        }
    }

    #[test]
    fn test_try_acquire_reports_contention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock_file.txt");

        let first = ArtifactLock::try_acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(ArtifactLock::try_acquire(&path).unwrap().is_none());
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("lock_file.txt");
        assert!(matches!(
            ArtifactLock::try_acquire(&path),
            Err(LockError::Io { .. })
        ));
    }
}
