//! Temporal window selection: which frame files a run needs.

use std::fmt::Write;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use nowcast_common::{align_down, ArchiveConfig, ConfigError, NowcastConfig};
use tracing::{debug, warn};

use crate::error::{NowcastError, NowcastResult};

/// Timestamps `t + iΔ` for `i` in `-(H-1)..=F`, with `t` aligned down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalWindow {
    /// Aligned reference time: the most recent input frame.
    pub reference: DateTime<Utc>,
    pub step: Duration,
    /// Number of conditioning frames (`H`).
    pub history: usize,
    /// Number of future frames (`F`); zero for a forecast-only window.
    pub future: usize,
}

impl TemporalWindow {
    pub fn new(
        t: DateTime<Utc>,
        step_minutes: u32,
        alignment_minutes: u32,
        history: usize,
        future: usize,
    ) -> Self {
        Self {
            reference: align_down(t, alignment_minutes),
            step: Duration::minutes(i64::from(step_minutes)),
            history,
            future,
        }
    }

    /// Window for `config`: `H = input_steps`, `F = prediction_steps` when
    /// `validation` is set, else 0.
    pub fn for_config(t: DateTime<Utc>, config: &NowcastConfig, validation: bool) -> Self {
        let future = if validation {
            config.prediction_steps
        } else {
            0
        };
        Self::new(
            t,
            config.step_minutes,
            config.alignment_minutes,
            config.input_steps,
            future,
        )
    }

    pub fn len(&self) -> usize {
        self.history + self.future
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_validation(&self) -> bool {
        self.future > 0
    }

    /// All timestamps, oldest first.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        let first = -(self.history as i64 - 1);
        (first..=self.future as i64)
            .map(|i| self.reference + self.step * i as i32)
            .collect()
    }

    /// The `H` conditioning timestamps.
    pub fn input_timestamps(&self) -> Vec<DateTime<Utc>> {
        let mut all = self.timestamps();
        all.truncate(self.history);
        all
    }

    /// The `F` observation timestamps following the reference time.
    pub fn target_timestamps(&self) -> Vec<DateTime<Utc>> {
        self.timestamps().split_off(self.history)
    }

    /// Resolve every timestamp to its archive path and check presence.
    ///
    /// Fails with [`NowcastError::MissingData`] listing every absent file.
    pub fn resolve(&self, archive: &ArchiveConfig) -> NowcastResult<FramePaths> {
        let paths: Vec<(DateTime<Utc>, PathBuf)> = self
            .timestamps()
            .into_iter()
            .map(|ts| frame_path(archive, ts).map(|path| (ts, path)))
            .collect::<NowcastResult<_>>()?;

        let missing: Vec<PathBuf> = paths
            .iter()
            .filter(|(_, p)| !p.is_file())
            .map(|(_, p)| p.clone())
            .collect();

        if !missing.is_empty() {
            warn!(
                reference = %self.reference,
                missing = missing.len(),
                first_missing = %missing[0].display(),
                "Radar frames unavailable"
            );
            return Err(NowcastError::MissingData { missing });
        }

        debug!(reference = %self.reference, frames = paths.len(), "Resolved temporal window");
        let mut inputs = paths;
        let targets = inputs.split_off(self.history);
        Ok(FramePaths { inputs, targets })
    }
}

/// Archive files of a resolved window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePaths {
    pub inputs: Vec<(DateTime<Utc>, PathBuf)>,
    pub targets: Vec<(DateTime<Utc>, PathBuf)>,
}

/// Path of the frame stamped `ts` under the archive naming convention.
///
/// An unparseable `filename_pattern` is a configuration error.
pub fn frame_path(archive: &ArchiveConfig, ts: DateTime<Utc>) -> NowcastResult<PathBuf> {
    let mut name = String::new();
    write!(name, "{}", ts.format(&archive.filename_pattern)).map_err(|_| {
        ConfigError::invalid_value(
            "archive.filename_pattern",
            format!("'{}' is not a valid strftime pattern", archive.filename_pattern),
        )
    })?;
    Ok(archive.root.join(name))
}
