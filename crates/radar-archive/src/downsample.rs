//! Block downsampling of native-resolution radar grids.
//!
//! Mosaics are stored at an integer multiple of the pipeline grid. Each
//! `factor × factor` block of input cells becomes one output cell; trailing
//! rows/columns that do not fill a whole block are dropped.

use nowcast_common::MaskRule;

/// Downsample a row-major grid by `factor` using the block mean.
///
/// NaN cells are ignored; a block with no finite value yields NaN.
///
/// # Returns
/// Tuple of (downsampled_data, new_rows, new_cols)
pub fn downsample_mean(
    data: &[f32],
    rows: usize,
    cols: usize,
    factor: usize,
) -> (Vec<f32>, usize, usize) {
    if factor <= 1 {
        return (data.to_vec(), rows, cols);
    }

    let new_rows = rows / factor;
    let new_cols = cols / factor;
    if new_rows == 0 || new_cols == 0 {
        return (vec![], 0, 0);
    }

    let mut output = vec![f32::NAN; new_rows * new_cols];

    for out_y in 0..new_rows {
        for out_x in 0..new_cols {
            let mut sum = 0.0f64;
            let mut count = 0u32;

            for dy in 0..factor {
                let row = (out_y * factor + dy) * cols;
                for dx in 0..factor {
                    let v = data[row + out_x * factor + dx];
                    if !v.is_nan() {
                        sum += v as f64;
                        count += 1;
                    }
                }
            }

            if count > 0 {
                output[out_y * new_cols + out_x] = (sum / count as f64) as f32;
            }
        }
    }

    (output, new_rows, new_cols)
}

/// Downsample a sentinel-flag grid by `factor`.
///
/// An output cell is flagged when `rule` holds for the flagged cells of its
/// block.
pub fn downsample_flags(
    data: &[bool],
    rows: usize,
    cols: usize,
    factor: usize,
    rule: MaskRule,
) -> Vec<bool> {
    if factor <= 1 {
        return data.to_vec();
    }

    let new_rows = rows / factor;
    let new_cols = cols / factor;
    let block = factor * factor;
    let mut output = vec![false; new_rows * new_cols];

    for out_y in 0..new_rows {
        for out_x in 0..new_cols {
            let flagged: usize = (0..factor)
                .map(|dy| {
                    let row = (out_y * factor + dy) * cols + out_x * factor;
                    data[row..row + factor].iter().filter(|&&b| b).count()
                })
                .sum();
            output[out_y * new_cols + out_x] = rule.holds(flagged, block);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_mean_2x() {
        // 4x4 grid:
        // 1  2  3  4
        // 5  6  7  8
        // 9  10 11 12
        // 13 14 15 16
        let data: Vec<f32> = (1..=16).map(|x| x as f32).collect();
        let (result, rows, cols) = downsample_mean(&data, 4, 4, 2);

        assert_eq!((rows, cols), (2, 2));
        assert_eq!(result, vec![3.5, 5.5, 11.5, 13.5]);
    }

    #[test]
    fn test_downsample_mean_skips_nan() {
        let data = vec![1.0, f32::NAN, 3.0, f32::NAN];
        let (result, _, _) = downsample_mean(&data, 2, 2, 2);
        assert_eq!(result, vec![2.0]);

        let (all_nan, _, _) = downsample_mean(&[f32::NAN; 4], 2, 2, 2);
        assert!(all_nan[0].is_nan());
    }

    #[test]
    fn test_downsample_odd_dimensions_truncate() {
        let data = vec![1.0f32; 5 * 7];
        let (result, rows, cols) = downsample_mean(&data, 5, 7, 2);
        assert_eq!((rows, cols), (2, 3));
        assert_eq!(result.len(), 6);
    }

    #[test]
    fn test_factor_one_is_identity() {
        let data = vec![1.0, 2.0, 3.0];
        assert_eq!(downsample_mean(&data, 1, 3, 1), (data.clone(), 1, 3));
        assert_eq!(
            downsample_flags(&[true, false], 1, 2, 1, MaskRule::All),
            vec![true, false]
        );
    }

    #[test]
    fn test_downsample_flags_by_rule() {
        // blocks hold 4, 1, 0 and 3 flagged cells
        #[rustfmt::skip]
        let data = vec![
            true,  true,  true,  false,
            true,  true,  false, false,
            false, false, true,  true,
            false, false, true,  false,
        ];
        assert_eq!(
            downsample_flags(&data, 4, 4, 2, MaskRule::All),
            vec![true, false, false, false]
        );
        assert_eq!(
            downsample_flags(&data, 4, 4, 2, MaskRule::Majority),
            vec![true, false, false, true]
        );
        assert_eq!(
            downsample_flags(&data, 4, 4, 2, MaskRule::Any),
            vec![true, true, false, true]
        );
    }
}
