//! Scoring a validation run against the observed frames.

use serde::Serialize;

use crate::error::{NowcastError, NowcastResult};
use crate::stitch::apply_mask;
use crate::types::{FrameStack, ForecastSequence, ValidityMask};

/// Error statistics at one lead time, over cells valid in both grids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadTimeScore {
    pub lead_minutes: u32,
    /// Mean absolute error, mm/h.
    pub mae: f32,
    /// Root mean square error, mm/h.
    pub rmse: f32,
    /// Mean of forecast minus observation, mm/h.
    pub bias: f32,
    pub valid_cells: usize,
}

/// Observations as a sequence masked like the forecast.
pub fn observation_sequence(observed: &FrameStack, mask: &ValidityMask) -> NowcastResult<ForecastSequence> {
    let frames = observed.frames().iter().map(|f| f.rates.clone()).collect();
    let mut sequence = ForecastSequence::new(observed.shape(), frames)?;
    apply_mask(&mut sequence, mask)?;
    Ok(sequence)
}

/// Per-lead-time scores. Masked and NaN cells are skipped; a lead time with
/// no valid cell scores NaN.
pub fn score_forecast(
    forecast: &ForecastSequence,
    observed: &ForecastSequence,
    step_minutes: u32,
) -> NowcastResult<Vec<LeadTimeScore>> {
    if forecast.shape() != observed.shape() {
        return Err(NowcastError::shape_mismatch(
            "observations",
            forecast.shape(),
            observed.shape(),
        ));
    }
    if forecast.steps() != observed.steps() {
        return Err(NowcastError::ShapeMismatch {
            context: "observations".to_string(),
            expected: format!("{} steps", forecast.steps()),
            actual: format!("{} steps", observed.steps()),
        });
    }

    let scores = forecast
        .frames()
        .iter()
        .zip(observed.frames())
        .enumerate()
        .map(|(i, (fc, obs))| {
            let mut abs = 0.0f64;
            let mut sq = 0.0f64;
            let mut sum = 0.0f64;
            let mut n = 0usize;
            for (&f, &o) in fc.iter().zip(obs) {
                if f.is_nan() || o.is_nan() {
                    continue;
                }
                let diff = (f - o) as f64;
                abs += diff.abs();
                sq += diff * diff;
                sum += diff;
                n += 1;
            }
            let (mae, rmse, bias) = if n == 0 {
                (f32::NAN, f32::NAN, f32::NAN)
            } else {
                let n = n as f64;
                ((abs / n) as f32, (sq / n).sqrt() as f32, (sum / n) as f32)
            };
            LeadTimeScore {
                lead_minutes: (i as u32 + 1) * step_minutes,
                mae,
                rmse,
                bias,
                valid_cells: n,
            }
        })
        .collect();

    Ok(scores)
}
