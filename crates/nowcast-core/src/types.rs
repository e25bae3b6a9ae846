//! Grids flowing through a run: input frames, the validity mask and the
//! forecast sequence.

use chrono::{DateTime, Duration, Utc};
use nowcast_common::GridShape;

use crate::error::{NowcastError, NowcastResult};
use crate::tiling::{crop_padded, WindowSpec};

/// A rain-rate grid (mm/h, row-major) at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarFrame {
    pub timestamp: DateTime<Utc>,
    pub shape: GridShape,
    pub rates: Vec<f32>,
}

impl RadarFrame {
    pub fn new(timestamp: DateTime<Utc>, shape: GridShape, rates: Vec<f32>) -> NowcastResult<Self> {
        if rates.len() != shape.len() {
            return Err(NowcastError::ShapeMismatch {
                context: format!("frame at {}", timestamp),
                expected: format!("{} cells", shape.len()),
                actual: format!("{} cells", rates.len()),
            });
        }
        Ok(Self {
            timestamp,
            shape,
            rates,
        })
    }

    /// The part of this frame under `window`, zero-padded past the grid edge.
    pub fn crop(&self, window: &WindowSpec) -> RadarFrame {
        RadarFrame {
            timestamp: self.timestamp,
            shape: window.shape(),
            rates: crop_padded(&self.rates, self.shape, window, 0.0),
        }
    }
}

/// Frames on a strictly increasing, fixed-step timeline. Index 0 is the
/// earliest frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStack {
    shape: GridShape,
    frames: Vec<RadarFrame>,
}

impl FrameStack {
    pub fn new(frames: Vec<RadarFrame>) -> NowcastResult<Self> {
        let first = frames.first().ok_or_else(|| NowcastError::ShapeMismatch {
            context: "frame stack".to_string(),
            expected: "at least one frame".to_string(),
            actual: "0 frames".to_string(),
        })?;
        let shape = first.shape;

        for frame in &frames[1..] {
            if frame.shape != shape {
                return Err(NowcastError::shape_mismatch(
                    format!("frame at {}", frame.timestamp),
                    shape,
                    frame.shape,
                ));
            }
        }

        if frames.len() > 1 {
            let step = frames[1].timestamp - frames[0].timestamp;
            let regular = step > Duration::zero()
                && frames
                    .windows(2)
                    .all(|pair| pair[1].timestamp - pair[0].timestamp == step);
            if !regular {
                return Err(NowcastError::ShapeMismatch {
                    context: "frame timeline".to_string(),
                    expected: "strictly increasing fixed step".to_string(),
                    actual: frames
                        .iter()
                        .map(|f| f.timestamp.format("%H:%M").to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                });
            }
        }

        Ok(Self { shape, frames })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[RadarFrame] {
        &self.frames
    }

    pub fn first(&self) -> &RadarFrame {
        &self.frames[0]
    }

    /// Most recent frame.
    pub fn last(&self) -> &RadarFrame {
        &self.frames[self.frames.len() - 1]
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.frames.iter().map(|f| f.timestamp).collect()
    }

    /// Crop every frame to `window`.
    pub fn crop(&self, window: &WindowSpec) -> FrameStack {
        FrameStack {
            shape: window.shape(),
            frames: self.frames.iter().map(|f| f.crop(window)).collect(),
        }
    }

    /// All frames concatenated, `(H, rows, cols)` row-major.
    pub fn to_tensor(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames.len() * self.shape.len());
        for frame in &self.frames {
            out.extend_from_slice(&frame.rates);
        }
        out
    }
}

/// Out-of-coverage cells (`true` = invalid), fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    shape: GridShape,
    invalid: Vec<bool>,
}

impl ValidityMask {
    pub fn new(shape: GridShape, invalid: Vec<bool>) -> NowcastResult<Self> {
        if invalid.len() != shape.len() {
            return Err(NowcastError::ShapeMismatch {
                context: "validity mask".to_string(),
                expected: format!("{} cells", shape.len()),
                actual: format!("{} cells", invalid.len()),
            });
        }
        Ok(Self { shape, invalid })
    }

    /// A mask with every cell inside coverage.
    pub fn all_valid(shape: GridShape) -> Self {
        Self {
            shape,
            invalid: vec![false; shape.len()],
        }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    #[inline]
    pub fn is_invalid(&self, index: usize) -> bool {
        self.invalid[index]
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid.iter().filter(|&&b| b).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.invalid
    }
}

/// Ordered forecast frames of one spatial shape. NaN marks "no data".
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSequence {
    shape: GridShape,
    frames: Vec<Vec<f32>>,
}

impl ForecastSequence {
    pub fn new(shape: GridShape, frames: Vec<Vec<f32>>) -> NowcastResult<Self> {
        if let Some((i, bad)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.len() != shape.len())
        {
            return Err(NowcastError::ShapeMismatch {
                context: format!("forecast step {}", i + 1),
                expected: format!("{} cells", shape.len()),
                actual: format!("{} cells", bad.len()),
            });
        }
        Ok(Self { shape, frames })
    }

    /// Split a `(steps, rows, cols)` row-major tensor into frames.
    pub fn from_tensor(shape: GridShape, steps: usize, data: Vec<f32>) -> NowcastResult<Self> {
        if data.len() != steps * shape.len() {
            return Err(NowcastError::ShapeMismatch {
                context: "forecast tensor".to_string(),
                expected: format!("{} x {}", steps, shape),
                actual: format!("{} values", data.len()),
            });
        }
        let frames = data.chunks_exact(shape.len().max(1)).map(<[f32]>::to_vec).collect();
        Ok(Self { shape, frames })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Number of lead times.
    pub fn steps(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    pub fn frame(&self, step: usize) -> &[f32] {
        &self.frames[step]
    }

    pub(crate) fn frames_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.frames
    }

    /// All frames concatenated, `(steps, rows, cols)` row-major.
    pub fn to_tensor(&self) -> Vec<f32> {
        self.frames.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()
    }

    fn frame(minute: u32, shape: GridShape) -> RadarFrame {
        RadarFrame::new(ts(minute), shape, vec![minute as f32; shape.len()]).unwrap()
    }

    #[test]
    fn test_stack_requires_common_shape() {
        let a = frame(0, GridShape::new(2, 2));
        let b = frame(5, GridShape::new(2, 3));
        let err = FrameStack::new(vec![a, b]).unwrap_err();
        assert!(matches!(err, NowcastError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_stack_requires_fixed_step() {
        let shape = GridShape::new(1, 1);
        let frames = vec![frame(0, shape), frame(5, shape), frame(15, shape)];
        assert!(FrameStack::new(frames).is_err());

        let frames = vec![frame(5, shape), frame(0, shape)];
        assert!(FrameStack::new(frames).is_err());

        let frames = vec![frame(0, shape), frame(5, shape), frame(10, shape)];
        let stack = FrameStack::new(frames).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.last().timestamp, ts(10));
        assert_eq!(stack.to_tensor(), vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_empty_stack_rejected() {
        assert!(FrameStack::new(vec![]).is_err());
    }

    #[test]
    fn test_mask_length_checked() {
        assert!(ValidityMask::new(GridShape::new(2, 2), vec![false; 3]).is_err());
        let mask = ValidityMask::new(GridShape::new(1, 2), vec![true, false]).unwrap();
        assert_eq!(mask.invalid_count(), 1);
        assert!(mask.is_invalid(0));
    }

    #[test]
    fn test_forecast_from_tensor() {
        let shape = GridShape::new(1, 2);
        let seq = ForecastSequence::from_tensor(shape, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(seq.steps(), 3);
        assert_eq!(seq.frame(2), &[5.0, 6.0]);
        assert_eq!(seq.to_tensor().len(), 6);

        assert!(ForecastSequence::from_tensor(shape, 2, vec![0.0; 5]).is_err());
        assert!(ForecastSequence::new(shape, vec![vec![0.0; 3]]).is_err());
    }
}
