//! Frame store: archived files to a decoded [`FrameStack`] and its mask.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nowcast_common::{DecodeConfig, FrameFormat, GridShape, MaskSource, NowcastConfig};
use radar_archive::read_frame;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{NowcastError, NowcastResult};
use crate::types::{FrameStack, RadarFrame, ValidityMask};

/// Decoded input frames plus the run's validity mask.
#[derive(Debug, Clone)]
pub struct LoadedInputs {
    pub stack: FrameStack,
    pub mask: ValidityMask,
}

/// Reads and decodes frames with one archive's format and decode settings.
#[derive(Debug, Clone)]
pub struct FrameStore {
    format: FrameFormat,
    decode: DecodeConfig,
    rate_factor: f32,
    grid: GridShape,
    mask_source: MaskSource,
}

impl FrameStore {
    pub fn new(
        format: FrameFormat,
        decode: DecodeConfig,
        rate_factor: f32,
        grid: GridShape,
        mask_source: MaskSource,
    ) -> Self {
        Self {
            format,
            decode,
            rate_factor,
            grid,
            mask_source,
        }
    }

    pub fn from_config(config: &NowcastConfig) -> Self {
        Self::new(
            config.archive.format,
            config.archive.decode(),
            config.rate_factor(),
            config.grid,
            config.mask_source,
        )
    }

    /// Decode frames (oldest first) and derive the mask from the configured
    /// source frame.
    pub fn load_inputs(&self, frames: &[(DateTime<Utc>, PathBuf)]) -> NowcastResult<LoadedInputs> {
        let mut decoded = self.decode_all(frames)?;

        let mask_index = match self.mask_source {
            MaskSource::Latest => decoded.len().saturating_sub(1),
            MaskSource::Earliest => 0,
        };
        let invalid = decoded
            .get_mut(mask_index)
            .map(|(_, invalid)| std::mem::take(invalid))
            .unwrap_or_default();
        let mask = ValidityMask::new(self.grid, invalid)?;

        let stack = FrameStack::new(decoded.into_iter().map(|(frame, _)| frame).collect())?;

        info!(
            frames = stack.len(),
            shape = %stack.shape(),
            invalid_cells = mask.invalid_count(),
            mask_source = ?self.mask_source,
            "Loaded input frames"
        );
        Ok(LoadedInputs { stack, mask })
    }

    /// Decode observation frames; their sentinel flags are discarded.
    pub fn load_observations(&self, frames: &[(DateTime<Utc>, PathBuf)]) -> NowcastResult<FrameStack> {
        let decoded = self.decode_all(frames)?;
        FrameStack::new(decoded.into_iter().map(|(frame, _)| frame).collect())
    }

    fn decode_all(
        &self,
        frames: &[(DateTime<Utc>, PathBuf)],
    ) -> NowcastResult<Vec<(RadarFrame, Vec<bool>)>> {
        frames
            .par_iter()
            .map(|(ts, path)| self.decode_one(*ts, path))
            .collect()
    }

    fn decode_one(&self, ts: DateTime<Utc>, path: &Path) -> NowcastResult<(RadarFrame, Vec<bool>)> {
        let decoded = read_frame(path, self.format, &self.decode, self.rate_factor).map_err(
            |source| NowcastError::Archive {
                path: path.to_path_buf(),
                source,
            },
        )?;

        if decoded.shape != self.grid {
            return Err(NowcastError::shape_mismatch(
                format!("decoded frame {}", path.display()),
                self.grid,
                decoded.shape,
            ));
        }

        debug!(
            path = %path.display(),
            invalid_cells = decoded.invalid_count(),
            "Decoded frame"
        );
        let frame = RadarFrame::new(ts, decoded.shape, decoded.rates)?;
        Ok((frame, decoded.invalid))
    }
}
