//! Reassembling window forecasts onto the full grid, then masking.
//!
//! Windows are written in descending `(row_off, col_off)` order, so the
//! south-east window goes first. A later window takes over a cell only if the
//! cell is still unwritten, or lies at least `overlap` cells away from each of
//! the window's edges that fall inside the grid. The band along a shared edge
//! therefore always keeps the earlier window's values. Nothing is blended and
//! the result depends only on the inputs.

use nowcast_common::GridShape;
use tracing::debug;

use crate::coordinator::WindowForecast;
use crate::error::{NowcastError, NowcastResult};
use crate::tiling::WindowSpec;
use crate::types::{ForecastSequence, ValidityMask};

const UNOWNED: u32 = u32::MAX;

/// Merge window forecasts into one `grid`-shaped sequence.
///
/// Cells no window covers are NaN.
pub fn stitch(
    grid: GridShape,
    overlap: usize,
    parts: &[WindowForecast],
) -> NowcastResult<ForecastSequence> {
    let first = parts
        .first()
        .ok_or_else(|| NowcastError::Inference("no window forecasts to stitch".to_string()))?;
    let steps = first.forecast.steps();

    for part in parts {
        if part.forecast.shape() != part.window.shape() {
            return Err(NowcastError::shape_mismatch(
                format!("forecast for window {}", part.window.name),
                part.window.shape(),
                part.forecast.shape(),
            ));
        }
        if part.forecast.steps() != steps {
            return Err(NowcastError::Inference(format!(
                "window {} has {} steps, window {} has {}",
                part.window.name,
                part.forecast.steps(),
                first.window.name,
                steps
            )));
        }
    }

    // Single window exactly on the grid: nothing to trim
    if parts.len() == 1 && parts[0].window.shape() == grid && parts[0].window.row_off == 0 && parts[0].window.col_off == 0 {
        return Ok(parts[0].forecast.clone());
    }

    let owners = owner_map(grid, overlap, parts);

    let mut frames = vec![vec![f32::NAN; grid.len()]; steps];
    for (cell, &owner) in owners.iter().enumerate() {
        if owner == UNOWNED {
            continue;
        }
        let part = &parts[owner as usize];
        let row = cell / grid.cols - part.window.row_off;
        let col = cell % grid.cols - part.window.col_off;
        let local = row * part.window.cols + col;
        for (step, frame) in frames.iter_mut().enumerate() {
            frame[cell] = part.forecast.frame(step)[local];
        }
    }

    debug!(
        windows = parts.len(),
        grid = %grid,
        uncovered = owners.iter().filter(|&&o| o == UNOWNED).count(),
        "Stitched window forecasts"
    );
    ForecastSequence::new(grid, frames)
}

/// Index into `parts` of the window each cell is sourced from.
fn owner_map(grid: GridShape, overlap: usize, parts: &[WindowForecast]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..parts.len()).collect();
    order.sort_by(|&a, &b| {
        let wa = &parts[a].window;
        let wb = &parts[b].window;
        (wb.row_off, wb.col_off).cmp(&(wa.row_off, wa.col_off))
    });

    let mut owners = vec![UNOWNED; grid.len()];
    for index in order {
        let window = &parts[index].window;
        let interior = InteriorEdges::of(window, grid);
        let row_end = window.row_end().min(grid.rows);
        let col_end = window.col_end().min(grid.cols);

        for row in window.row_off..row_end {
            let local_row = row - window.row_off;
            let row_deep = interior.row_is_deep(local_row, window.rows, overlap);
            for col in window.col_off..col_end {
                let cell = row * grid.cols + col;
                let deep = row_deep
                    && interior.col_is_deep(col - window.col_off, window.cols, overlap);
                if owners[cell] == UNOWNED || deep {
                    owners[cell] = index as u32;
                }
            }
        }
    }
    owners
}

/// Which edges of a window lie strictly inside the grid.
struct InteriorEdges {
    top: bool,
    left: bool,
    bottom: bool,
    right: bool,
}

impl InteriorEdges {
    fn of(window: &WindowSpec, grid: GridShape) -> Self {
        Self {
            top: window.row_off > 0,
            left: window.col_off > 0,
            bottom: window.row_end() < grid.rows,
            right: window.col_end() < grid.cols,
        }
    }

    #[inline]
    fn row_is_deep(&self, local: usize, extent: usize, band: usize) -> bool {
        (!self.top || local >= band) && (!self.bottom || extent - local > band)
    }

    #[inline]
    fn col_is_deep(&self, local: usize, extent: usize, band: usize) -> bool {
        (!self.left || local >= band) && (!self.right || extent - local > band)
    }
}

/// Set every invalid cell to NaN in every step.
pub fn apply_mask(sequence: &mut ForecastSequence, mask: &ValidityMask) -> NowcastResult<()> {
    if sequence.shape() != mask.shape() {
        return Err(NowcastError::shape_mismatch(
            "validity mask",
            sequence.shape(),
            mask.shape(),
        ));
    }
    let invalid = mask.as_slice();
    for frame in sequence.frames_mut() {
        for (value, &masked) in frame.iter_mut().zip(invalid) {
            if masked {
                *value = f32::NAN;
            }
        }
    }
    Ok(())
}
