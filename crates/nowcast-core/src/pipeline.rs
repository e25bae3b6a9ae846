//! One nowcast run, end to end.
//!
//! ```text
//! SELECT_WINDOW -> LOAD_FRAMES -> (INFER | TILE -> INFER xN -> STITCH) -> MASK -> RENDER
//! ```
//!
//! Any error ends the run in `MISSING_DATA`, `SHAPE_MISMATCH` or
//! `INFERENCE_FAILURE` (see [`NowcastError::failure_state`]). Runs are not
//! resumable and the renderer only ever sees a complete, masked forecast.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::counter;
use nowcast_common::{NowcastConfig, RunKind};
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::coordinator::TilingCoordinator;
use crate::error::{NowcastError, NowcastResult};
use crate::forecaster::Forecaster;
use crate::render::{RenderRequest, RenderedArtifact, Renderer};
use crate::selector::TemporalWindow;
use crate::stitch::{apply_mask, stitch};
use crate::store::FrameStore;
use crate::tiling::WindowSpec;
use crate::types::{FrameStack, ForecastSequence, ValidityMask};
use crate::verification::{observation_sequence, score_forecast, LeadTimeScore};

/// Pipeline states a run passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    SelectWindow,
    LoadFrames,
    Tile,
    Infer,
    Stitch,
    Mask,
    Render,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::SelectWindow => "SELECT_WINDOW",
            RunState::LoadFrames => "LOAD_FRAMES",
            RunState::Tile => "TILE",
            RunState::Infer => "INFER",
            RunState::Stitch => "STITCH",
            RunState::Mask => "MASK",
            RunState::Render => "RENDER",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full-grid forecast before rendering.
#[derive(Debug, Clone)]
pub struct GridForecast {
    pub windows: Vec<WindowSpec>,
    pub forecast: ForecastSequence,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub run_time: DateTime<Utc>,
    pub kind: RunKind,
    pub states: Vec<RunState>,
    pub windows: Vec<WindowSpec>,
    pub forecast: ForecastSequence,
    pub scores: Vec<LeadTimeScore>,
    pub artifact: Option<RenderedArtifact>,
}

/// Wires the selector, frame store, coordinator, stitcher and renderer.
pub struct NowcastPipeline<'a> {
    config: &'a NowcastConfig,
    forecaster: &'a dyn Forecaster,
    renderer: Option<&'a dyn Renderer>,
}

impl<'a> NowcastPipeline<'a> {
    pub fn new(config: &'a NowcastConfig, forecaster: &'a dyn Forecaster) -> Self {
        Self {
            config,
            forecaster,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: &'a dyn Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Run the pipeline for reference time `run_time`.
    pub fn run(&self, run_time: DateTime<Utc>, kind: RunKind) -> NowcastResult<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("nowcast_run", %run_id, %run_time, ?kind);
        let _guard = span.enter();

        let started = Instant::now();
        let mut states = Vec::new();
        let result = self.execute(run_id, run_time, kind, &mut states);

        match &result {
            Ok(report) => {
                counter!("nowcast_runs_total", "outcome" => "success").increment(1);
                info!(
                    windows = report.windows.len(),
                    steps = report.forecast.steps(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Nowcast run complete"
                );
            }
            Err(e) => {
                let state = e.failure_state();
                counter!("nowcast_runs_total", "outcome" => state.as_str()).increment(1);
                error!(
                    failure = state.as_str(),
                    last_state = states.last().map(RunState::as_str).unwrap_or("START"),
                    error = %e,
                    "Nowcast run aborted; no artifacts written"
                );
            }
        }
        result
    }

    fn execute(
        &self,
        run_id: Uuid,
        run_time: DateTime<Utc>,
        kind: RunKind,
        states: &mut Vec<RunState>,
    ) -> NowcastResult<RunReport> {
        let config = self.config;

        enter(states, RunState::SelectWindow);
        let window = TemporalWindow::for_config(run_time, config, kind == RunKind::Validation);
        let paths = window.resolve(&config.archive)?;

        enter(states, RunState::LoadFrames);
        let store = FrameStore::from_config(config);
        let inputs = store.load_inputs(&paths.inputs)?;
        let observed = if paths.targets.is_empty() {
            None
        } else {
            Some(store.load_observations(&paths.targets)?)
        };

        let GridForecast { windows, forecast } =
            self.forecast_grid(&inputs.stack, &inputs.mask, states)?;

        let (observed, scores) = match observed {
            Some(stack) => {
                let observed = observation_sequence(&stack, &inputs.mask)?;
                let scores = score_forecast(&forecast, &observed, config.step_minutes)?;
                (Some(observed), scores)
            }
            None => (None, Vec::new()),
        };

        let artifact = match self.renderer {
            Some(renderer) => {
                enter(states, RunState::Render);
                let request = RenderRequest {
                    run_id,
                    run_time: window.reference,
                    kind,
                    step_minutes: config.step_minutes,
                    forecast: &forecast,
                    observed: observed.as_ref(),
                    scores: &scores,
                    windows: &windows,
                };
                Some(renderer.render(&request)?)
            }
            None => None,
        };

        Ok(RunReport {
            run_id,
            run_time: window.reference,
            kind,
            states: std::mem::take(states),
            windows,
            forecast,
            scores,
            artifact,
        })
    }

    /// Tile, infer, stitch and mask an already loaded stack.
    pub fn forecast_grid(
        &self,
        stack: &FrameStack,
        mask: &ValidityMask,
        states: &mut Vec<RunState>,
    ) -> NowcastResult<GridForecast> {
        if stack.shape() != self.config.grid {
            return Err(NowcastError::shape_mismatch("input stack", self.config.grid, stack.shape()));
        }

        let coordinator = TilingCoordinator::new(self.forecaster, self.config);
        let windows = coordinator.plan();

        let mut forecast = if windows.len() == 1 && windows[0].shape() == self.config.grid {
            enter(states, RunState::Infer);
            let only = coordinator.infer_window(stack, windows[0].clone())?;
            only.forecast
        } else {
            enter(states, RunState::Tile);
            enter(states, RunState::Infer);
            let parts = coordinator.infer_all(stack)?;
            enter(states, RunState::Stitch);
            stitch(self.config.grid, self.config.overlap_px, &parts)?
        };

        enter(states, RunState::Mask);
        apply_mask(&mut forecast, mask)?;

        Ok(GridForecast { windows, forecast })
    }
}

fn enter(states: &mut Vec<RunState>, state: RunState) {
    info!(state = state.as_str(), "Entering state");
    states.push(state);
}

/// Convenience for callers that only hold a config and a forecaster.
pub fn run_once(
    config: &NowcastConfig,
    forecaster: &dyn Forecaster,
    renderer: &dyn Renderer,
    run_time: DateTime<Utc>,
    kind: RunKind,
) -> NowcastResult<RunReport> {
    NowcastPipeline::new(config, forecaster)
        .with_renderer(renderer)
        .run(run_time, kind)
}
