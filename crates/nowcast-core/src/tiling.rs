//! Window planning: covering the full grid with model-sized windows.
//!
//! Along each axis of length `L` with model extent `T` and overlap band `W`:
//! - `L <= T`: one window at offset 0 (zero-padded when `L < T`);
//! - otherwise `n = ceil((L - W) / (T - W))` windows, evenly spread between
//!   offset 0 and `L - T`, so neighbours always overlap by at least `W`;
//! - when that gives more than two windows, `n` grows until the stride is at
//!   most `T - 2W`. A middle window then has bands on both sides and each
//!   cell still lies at least `W` inside some window, which is where
//!   [`stitch`](crate::stitch::stitch) takes it from.
//!
//! Windows are the product of the row and column placements. The first and
//! last window on each axis are anchored to the grid's edges.

use std::fmt;

use nowcast_common::GridShape;
use serde::Serialize;

/// A named model-sized rectangle on the full grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WindowSpec {
    pub name: String,
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl WindowSpec {
    pub fn new(name: impl Into<String>, row_off: usize, col_off: usize, shape: GridShape) -> Self {
        Self {
            name: name.into(),
            row_off,
            col_off,
            rows: shape.rows,
            cols: shape.cols,
        }
    }

    /// The window covering exactly the whole grid.
    pub fn full(grid: GridShape) -> Self {
        Self::new("full", 0, 0, grid)
    }

    pub fn shape(&self) -> GridShape {
        GridShape::new(self.rows, self.cols)
    }

    pub fn row_end(&self) -> usize {
        self.row_off + self.rows
    }

    pub fn col_end(&self) -> usize {
        self.col_off + self.cols
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}..{}, {}..{}]",
            self.name,
            self.row_off,
            self.row_end(),
            self.col_off,
            self.col_end()
        )
    }
}

/// Window offsets along one axis.
pub fn axis_offsets(length: usize, extent: usize, overlap: usize) -> Vec<usize> {
    if length <= extent {
        return vec![0];
    }
    let span = length - extent;
    let stride = extent.saturating_sub(overlap).max(1);
    let mut count = (length - overlap).div_ceil(stride).max(2);
    if count > 2 {
        let inner = extent.saturating_sub(2 * overlap).max(1);
        count = count.max(span.div_ceil(inner) + 1);
    }
    (0..count).map(|i| i * span / (count - 1)).collect()
}

/// Cover `grid` with windows of `model` shape overlapping by `overlap` cells.
///
/// Windows are listed row-major, north-west first.
pub fn plan_windows(grid: GridShape, model: GridShape, overlap: usize) -> Vec<WindowSpec> {
    if grid == model {
        return vec![WindowSpec::full(grid)];
    }

    let row_offsets = axis_offsets(grid.rows, model.rows, overlap);
    let col_offsets = axis_offsets(grid.cols, model.cols, overlap);
    let compass = row_offsets.len() <= 2 && col_offsets.len() <= 2;

    let mut windows = Vec::with_capacity(row_offsets.len() * col_offsets.len());
    for (i, &row_off) in row_offsets.iter().enumerate() {
        for (j, &col_off) in col_offsets.iter().enumerate() {
            let name = if compass {
                compass_name(i, row_offsets.len(), j, col_offsets.len())
            } else {
                format!("r{}c{}", i, j)
            };
            windows.push(WindowSpec::new(name, row_off, col_off, model));
        }
    }
    windows
}

fn compass_name(i: usize, rows: usize, j: usize, cols: usize) -> String {
    let ns = match (rows, i) {
        (1, _) => "",
        (_, 0) => "n",
        _ => "s",
    };
    let we = match (cols, j) {
        (1, _) => "",
        (_, 0) => "w",
        _ => "e",
    };
    let name = format!("{}{}", ns, we);
    if name.is_empty() {
        "full".to_string()
    } else {
        name
    }
}

/// Copy the part of `data` (shape `grid`) under `window`; cells of the
/// window beyond the grid edge get `fill`.
pub fn crop_padded<T: Copy>(data: &[T], grid: GridShape, window: &WindowSpec, fill: T) -> Vec<T> {
    let mut out = vec![fill; window.rows * window.cols];
    let row_end = window.row_end().min(grid.rows);
    let col_end = window.col_end().min(grid.cols);
    if window.col_off >= col_end {
        return out;
    }
    let width = col_end - window.col_off;

    for row in window.row_off..row_end {
        let src = row * grid.cols + window.col_off;
        let dst = (row - window.row_off) * window.cols;
        out[dst..dst + width].copy_from_slice(&data[src..src + width]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_window_when_grid_matches_model() {
        let grid = GridShape::new(1536, 1280);
        let windows = plan_windows(grid, grid, 256);
        assert_eq!(windows, vec![WindowSpec::full(grid)]);
    }

    #[test]
    fn test_national_grid_split_west_east() {
        let windows = plan_windows(GridShape::new(1536, 1536), GridShape::new(1536, 1280), 256);
        let names: Vec<&str> = windows.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["w", "e"]);
        assert_eq!((windows[0].row_off, windows[0].col_off), (0, 0));
        assert_eq!((windows[1].row_off, windows[1].col_off), (0, 256));
    }

    #[test]
    fn test_square_grid_needs_four_windows() {
        let windows = plan_windows(GridShape::new(1736, 1736), GridShape::new(1536, 1280), 256);
        let names: Vec<&str> = windows.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["nw", "ne", "sw", "se"]);
        let se = &windows[3];
        assert_eq!((se.row_off, se.col_off), (200, 456));
        assert_eq!((se.row_end(), se.col_end()), (1736, 1736));
    }

    #[test]
    fn test_axis_offsets_keep_minimum_overlap() {
        for length in [1001, 1300, 2048, 3000, 5000] {
            let offsets = axis_offsets(length, 1000, 200);
            assert_eq!(offsets[0], 0);
            assert_eq!(*offsets.last().unwrap(), length - 1000);
            for pair in offsets.windows(2) {
                let overlap = 1000 - (pair[1] - pair[0]);
                assert!(overlap >= 200, "length {} overlap {}", length, overlap);
            }
        }
    }

    #[test]
    fn test_middle_windows_leave_room_for_both_bands() {
        for (length, extent, overlap) in [(3000, 1280, 256), (30, 10, 4), (5000, 1000, 200)] {
            let offsets = axis_offsets(length, extent, overlap);
            assert!(offsets.len() > 2);
            for pair in offsets.windows(2) {
                assert!(
                    pair[1] - pair[0] <= extent - 2 * overlap,
                    "length {} offsets {:?}",
                    length,
                    offsets
                );
            }
        }
        // Two windows only need the single shared band
        assert_eq!(axis_offsets(1536, 1280, 256), vec![0, 256]);
    }

    #[test]
    fn test_many_windows_use_grid_names() {
        let windows = plan_windows(GridShape::new(30, 30), GridShape::new(10, 10), 2);
        assert!(windows.len() > 4);
        assert_eq!(windows[0].name, "r0c0");
    }

    #[test]
    fn test_small_axis_single_padded_window() {
        let windows = plan_windows(GridShape::new(100, 2000), GridShape::new(128, 1280), 64);
        assert!(windows.iter().all(|w| w.row_off == 0 && w.rows == 128));
        assert_eq!(windows[0].name, "w");
    }

    #[test]
    fn test_crop_padded() {
        // 3x3 grid: 0..9
        let data: Vec<i32> = (0..9).collect();
        let grid = GridShape::new(3, 3);

        let inner = WindowSpec::new("x", 1, 1, GridShape::new(2, 2));
        assert_eq!(crop_padded(&data, grid, &inner, -1), vec![4, 5, 7, 8]);

        let overhang = WindowSpec::new("y", 2, 1, GridShape::new(2, 3));
        assert_eq!(crop_padded(&data, grid, &overhang, -1), vec![7, 8, -1, -1, -1, -1]);
    }
}
