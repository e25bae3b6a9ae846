//! Time alignment helpers for radar frame timestamps.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::NowcastConfig;

/// strftime pattern used to label run artifacts.
pub const RUN_LABEL_FORMAT: &str = "%Y-%m-%d_%Hh%M";

/// Kind of forecast run, which determines how far back "now" is shifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Real-time forecast with no ground truth yet.
    Forecast,
    /// Hindcast far enough in the past that observations cover the horizon.
    Validation,
}

/// Round a timestamp down to the previous multiple of `minutes` (epoch aligned).
///
/// Timestamps already on the boundary are returned unchanged; sub-minute
/// components are always dropped.
pub fn align_down(ts: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
    let interval = i64::from(minutes.max(1)) * 60;
    let secs = ts.timestamp();
    let aligned = secs - secs.rem_euclid(interval);
    Utc.timestamp_opt(aligned, 0)
        .single()
        .unwrap_or(ts)
}

/// Reference time of the run to launch at wall-clock time `now`.
///
/// `now` is aligned down to the configured alignment interval, then shifted
/// back by the latency (forecast runs) or validation lag (validation runs).
pub fn run_time_for(now: DateTime<Utc>, config: &NowcastConfig, kind: RunKind) -> DateTime<Utc> {
    let offset = match kind {
        RunKind::Forecast => config.latency_minutes,
        RunKind::Validation => config.validation_lag_minutes,
    };
    let aligned = align_down(now, config.alignment_minutes);
    align_down(
        aligned - Duration::minutes(i64::from(offset)),
        config.alignment_minutes,
    )
}

/// Artifact label for a run time, e.g. `2024-01-15_12h05`.
pub fn run_label(ts: DateTime<Utc>) -> String {
    ts.format(RUN_LABEL_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_align_down_rounds_down() {
        assert_eq!(align_down(utc(2024, 1, 15, 14, 7, 0), 15), utc(2024, 1, 15, 14, 0, 0));
        assert_eq!(align_down(utc(2024, 1, 15, 14, 7, 59), 5), utc(2024, 1, 15, 14, 5, 0));
        assert_eq!(align_down(utc(2024, 1, 15, 14, 59, 59), 15), utc(2024, 1, 15, 14, 45, 0));
    }

    #[test]
    fn test_align_down_keeps_aligned() {
        let ts = utc(2024, 1, 15, 14, 10, 0);
        assert_eq!(align_down(ts, 5), ts);
    }

    #[test]
    fn test_align_down_drops_subseconds() {
        let ts = utc(2024, 1, 15, 14, 10, 0) + Duration::milliseconds(750);
        assert_eq!(align_down(ts, 5), utc(2024, 1, 15, 14, 10, 0));
    }

    #[test]
    fn test_run_time_for_forecast_and_validation() {
        let config = NowcastConfig::default();
        let now = utc(2024, 1, 15, 14, 7, 31);
        assert_eq!(
            run_time_for(now, &config, RunKind::Forecast),
            utc(2024, 1, 15, 14, 0, 0)
        );
        assert_eq!(
            run_time_for(now, &config, RunKind::Validation),
            utc(2024, 1, 15, 12, 5, 0)
        );
    }

    #[test]
    fn test_run_label() {
        assert_eq!(run_label(utc(2024, 1, 15, 12, 5, 0)), "2024-01-15_12h05");
    }
}
