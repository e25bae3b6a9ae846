//! Tiling and inference: crop the stack per window and call the forecaster
//! once for each.

use std::time::Instant;

use metrics::{counter, histogram};
use nowcast_common::{GridShape, NowcastConfig};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{NowcastError, NowcastResult};
use crate::forecaster::Forecaster;
use crate::tiling::{plan_windows, WindowSpec};
use crate::types::{FrameStack, ForecastSequence};

/// Forecast output of one window.
#[derive(Debug, Clone)]
pub struct WindowForecast {
    pub window: WindowSpec,
    pub forecast: ForecastSequence,
}

/// Runs the forecaster over every window of the grid.
pub struct TilingCoordinator<'a> {
    forecaster: &'a dyn Forecaster,
    grid: GridShape,
    model_input: GridShape,
    overlap: usize,
    steps: usize,
    parallel: bool,
}

impl<'a> TilingCoordinator<'a> {
    pub fn new(forecaster: &'a dyn Forecaster, config: &NowcastConfig) -> Self {
        Self {
            forecaster,
            grid: config.grid,
            model_input: config.model_input,
            overlap: config.overlap_px,
            steps: config.prediction_steps,
            parallel: config.parallel_windows,
        }
    }

    /// Windows covering the grid.
    pub fn plan(&self) -> Vec<WindowSpec> {
        plan_windows(self.grid, self.model_input, self.overlap)
    }

    /// Infer every planned window. Results keep the plan's order.
    pub fn infer_all(&self, stack: &FrameStack) -> NowcastResult<Vec<WindowForecast>> {
        if stack.shape() != self.grid {
            return Err(NowcastError::shape_mismatch("input stack", self.grid, stack.shape()));
        }

        let windows = self.plan();
        info!(
            windows = windows.len(),
            grid = %self.grid,
            model_input = %self.model_input,
            parallel = self.parallel,
            "Running tiled inference"
        );

        if self.parallel && windows.len() > 1 {
            windows
                .into_par_iter()
                .map(|window| self.infer_window(stack, window))
                .collect()
        } else {
            windows
                .into_iter()
                .map(|window| self.infer_window(stack, window))
                .collect()
        }
    }

    /// Crop the stack to `window`, forecast it and check the output shape.
    pub fn infer_window(&self, stack: &FrameStack, window: WindowSpec) -> NowcastResult<WindowForecast> {
        let cropped = if window.row_off == 0 && window.col_off == 0 && window.shape() == stack.shape() {
            stack.clone()
        } else {
            stack.crop(&window)
        };

        let started = Instant::now();
        let forecast = self.forecaster.forecast(&cropped, self.steps)?;
        let elapsed = started.elapsed();

        histogram!("nowcast_inference_seconds").record(elapsed.as_secs_f64());
        counter!("nowcast_windows_total").increment(1);

        if forecast.shape() != window.shape() {
            return Err(NowcastError::shape_mismatch(
                format!("forecast for window {}", window.name),
                window.shape(),
                forecast.shape(),
            ));
        }
        if forecast.steps() != self.steps {
            return Err(NowcastError::Inference(format!(
                "window {} returned {} steps, expected {}",
                window.name,
                forecast.steps(),
                self.steps
            )));
        }

        debug!(
            window = %window,
            forecaster = self.forecaster.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Window inference complete"
        );
        Ok(WindowForecast { window, forecast })
    }
}
