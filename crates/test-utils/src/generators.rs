//! Synthetic rain fields.
//!
//! All grids are row-major `Vec`s of `rows * cols` cells.

/// A dry field.
pub fn zero_field(rows: usize, cols: usize) -> Vec<f32> {
    vec![0.0; rows * cols]
}

/// A dry field with one rectangular rain cell.
///
/// # Example
///
/// ```
/// use test_utils::rain_block;
///
/// let field = rain_block(4, 4, (1, 2), (2, 2), 5.0);
/// assert_eq!(field[1 * 4 + 2], 5.0);
/// assert_eq!(field[0], 0.0);
/// ```
pub fn rain_block(
    rows: usize,
    cols: usize,
    origin: (usize, usize),
    size: (usize, usize),
    value: f32,
) -> Vec<f32> {
    let mut data = zero_field(rows, cols);
    let (r0, c0) = origin;
    for row in r0..(r0 + size.0).min(rows) {
        for col in c0..(c0 + size.1).min(cols) {
            data[row * cols + col] = value;
        }
    }
    data
}

/// A field whose value encodes its position: `row * 1000 + col`.
///
/// Handy for checking that crops and stitches pick cells from the right place.
pub fn position_field(rows: usize, cols: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            data.push((row * 1000 + col) as f32);
        }
    }
    data
}

/// Out-of-coverage flags for a circular radar footprint.
///
/// Cells farther than `radius` from the grid centre are `true`.
pub fn coverage_outside_disc(rows: usize, cols: usize, radius: f32) -> Vec<bool> {
    let cy = (rows as f32 - 1.0) / 2.0;
    let cx = (cols as f32 - 1.0) / 2.0;
    let mut flags = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let dy = row as f32 - cy;
            let dx = col as f32 - cx;
            flags.push((dx * dx + dy * dy).sqrt() > radius);
        }
    }
    flags
}
