//! Raw archive arrays to rain-rate grids.

use nowcast_common::{DecodeConfig, GridShape};

use crate::downsample::{downsample_flags, downsample_mean};
use crate::error::{ArchiveError, ArchiveResult};
use crate::npy::RawArray;

/// One decoded frame at pipeline resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub shape: GridShape,
    /// Rain rate in mm/h, row-major. Out-of-coverage cells hold 0.
    pub rates: Vec<f32>,
    /// `true` where the raw value was the out-of-coverage sentinel.
    pub invalid: Vec<bool>,
}

impl DecodedFrame {
    pub fn invalid_count(&self) -> usize {
        self.invalid.iter().filter(|&&b| b).count()
    }
}

/// Decode a raw 2-D array.
///
/// Order of operations:
/// 1. sentinel cells are flagged and, with any negative value, set to zero;
/// 2. block-mean downsampling by `config.downsample` (the flag grid follows
///    `config.mask_rule`);
/// 3. top-left crop to `config.crop`;
/// 4. counts become mm/h: `count * depth_scale_mm * rate_factor`.
///
/// `rate_factor` is the number of frame steps per hour.
pub fn decode_frame(
    raw: RawArray,
    config: &DecodeConfig,
    rate_factor: f32,
) -> ArchiveResult<DecodedFrame> {
    let (rows, cols) = grid_dims(&raw.shape)?;
    let mut values = raw.data;

    let mut invalid = Vec::with_capacity(values.len());
    for v in values.iter_mut() {
        let is_sentinel = config.sentinel.matches(*v);
        invalid.push(is_sentinel);
        if is_sentinel || *v < 0.0 {
            *v = 0.0;
        }
    }

    let factor = config.downsample.max(1);
    let invalid = downsample_flags(&invalid, rows, cols, factor, config.mask_rule);
    let (values, rows, cols) = downsample_mean(&values, rows, cols, factor);
    if rows == 0 || cols == 0 {
        return Err(ArchiveError::invalid(format!(
            "grid too small for downsample factor {}",
            factor
        )));
    }

    let (mut values, mut invalid, shape) = match config.crop {
        Some(crop) if crop != GridShape::new(rows, cols) => {
            if crop.rows > rows || crop.cols > cols {
                return Err(ArchiveError::invalid(format!(
                    "crop {} exceeds decoded grid {}x{}",
                    crop, rows, cols
                )));
            }
            (
                crop_top_left(&values, cols, crop),
                crop_top_left(&invalid, cols, crop),
                crop,
            )
        }
        _ => (values, invalid, GridShape::new(rows, cols)),
    };
    values.shrink_to_fit();
    invalid.shrink_to_fit();

    let scale = config.depth_scale_mm * rate_factor;
    for v in values.iter_mut() {
        *v *= scale;
    }

    Ok(DecodedFrame {
        shape,
        rates: values,
        invalid,
    })
}

/// Rows and columns of a raw array once leading unit axes are dropped.
fn grid_dims(shape: &[usize]) -> ArchiveResult<(usize, usize)> {
    let mut dims = shape;
    while dims.len() > 2 && dims[0] == 1 {
        dims = &dims[1..];
    }
    while dims.len() > 2 && dims[dims.len() - 1] == 1 {
        dims = &dims[..dims.len() - 1];
    }
    match dims {
        [rows, cols] => Ok((*rows, *cols)),
        _ => Err(ArchiveError::invalid(format!(
            "expected a 2-D grid, got shape {:?}",
            shape
        ))),
    }
}

fn crop_top_left<T: Copy>(data: &[T], cols: usize, crop: GridShape) -> Vec<T> {
    let mut out = Vec::with_capacity(crop.len());
    for row in 0..crop.rows {
        let start = row * cols;
        out.extend_from_slice(&data[start..start + crop.cols]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowcast_common::{FrameFormat, MaskRule, Sentinel};
    use test_utils::assert_approx_eq;

    fn raw(shape: &[usize], data: Vec<f32>) -> RawArray {
        RawArray::new(shape.to_vec(), data).unwrap()
    }

    #[test]
    fn test_odim_decode_sentinel_downsample_and_rate() {
        let config = DecodeConfig::for_format(FrameFormat::OdimH5);
        // 2x4 native -> 1x2 after 2x block mean
        let frame = raw(
            &[2, 4],
            vec![
                100.0, 100.0, 65535.0, 65535.0, //
                100.0, 100.0, 65535.0, 65535.0,
            ],
        );

        let decoded = decode_frame(frame, &config, 12.0).unwrap();
        assert_eq!(decoded.shape, GridShape::new(1, 2));
        // 100 counts * 0.01 mm * 12 steps/h
        assert_approx_eq!(decoded.rates[0], 12.0, 1e-5);
        assert_eq!(decoded.rates[1], 0.0);
        assert_eq!(decoded.invalid, vec![false, true]);
    }

    #[test]
    fn test_partially_flagged_block_stays_valid() {
        let config = DecodeConfig::for_format(FrameFormat::OdimH5);
        let frame = raw(&[2, 2], vec![65535.0, 200.0, 200.0, 200.0]);

        let decoded = decode_frame(frame, &config, 12.0).unwrap();
        assert_eq!(decoded.invalid, vec![false]);
        // sentinel counted as zero in the mean
        assert_approx_eq!(decoded.rates[0], 150.0 * 0.01 * 12.0, 1e-4);
    }

    #[test]
    fn test_npz_decode_negative_sentinel_and_crop() {
        let mut config = DecodeConfig::for_format(FrameFormat::Npz);
        config.crop = Some(GridShape::new(2, 2));
        let frame = raw(
            &[2, 3],
            vec![
                -1.0, 50.0, 7.0, //
                25.0, 0.0, 9.0,
            ],
        );

        let decoded = decode_frame(frame, &config, 12.0).unwrap();
        assert_eq!(decoded.shape, GridShape::new(2, 2));
        assert_eq!(decoded.invalid, vec![true, false, false, false]);
        assert_eq!(decoded.rates[0], 0.0);
        assert_approx_eq!(decoded.rates[1], 6.0, 1e-5);
        assert_approx_eq!(decoded.rates[2], 3.0, 1e-5);
        assert_eq!(decoded.invalid_count(), 1);
    }

    #[test]
    fn test_majority_rule_masks_coverage_edge_blocks() {
        let config = DecodeConfig {
            mask_rule: MaskRule::Majority,
            ..DecodeConfig::for_format(FrameFormat::OdimH5)
        };
        // left block: 3 of 4 sentinel, right block: 1 of 4
        let frame = raw(
            &[2, 4],
            vec![
                65535.0, 65535.0, 65535.0, 100.0, //
                65535.0, 100.0, 100.0, 100.0,
            ],
        );
        let decoded = decode_frame(frame.clone(), &config, 12.0).unwrap();
        assert_eq!(decoded.invalid, vec![true, false]);

        let all = decode_frame(frame, &DecodeConfig::for_format(FrameFormat::OdimH5), 12.0).unwrap();
        assert_eq!(all.invalid, vec![false, false]);
    }

    #[test]
    fn test_negative_values_clamped_without_sentinel_flag() {
        let config = DecodeConfig {
            sentinel: Sentinel::Equals { value: 65535.0 },
            downsample: 1,
            ..DecodeConfig::default()
        };
        let decoded = decode_frame(raw(&[1, 2], vec![-3.0, 10.0]), &config, 12.0).unwrap();
        assert_eq!(decoded.rates[0], 0.0);
        assert_eq!(decoded.invalid, vec![false, false]);
    }

    #[test]
    fn test_unit_axes_are_squeezed() {
        let config = DecodeConfig::for_format(FrameFormat::Npy);
        let decoded = decode_frame(raw(&[1, 2, 2, 1], vec![0.0; 4]), &config, 12.0).unwrap();
        assert_eq!(decoded.shape, GridShape::new(2, 2));
    }

    #[test]
    fn test_rejects_non_grid_and_oversized_crop() {
        let config = DecodeConfig::for_format(FrameFormat::Npy);
        assert!(decode_frame(raw(&[2, 2, 2], vec![0.0; 8]), &config, 12.0).is_err());

        let mut cropped = config.clone();
        cropped.crop = Some(GridShape::new(3, 3));
        assert!(decode_frame(raw(&[2, 2], vec![0.0; 4]), &cropped, 12.0).is_err());
    }
}
