//! Radar precipitation nowcasting core.
//!
//! A run turns a reference timestamp into a full-grid rain-rate forecast:
//!
//! 1. [`selector`] picks the frame files of the temporal window.
//! 2. [`store`] decodes them into a [`FrameStack`] plus a [`ValidityMask`].
//! 3. [`tiling`] and [`coordinator`] cut the grid into model-sized windows and
//!    call the [`Forecaster`] once per window.
//! 4. [`stitch`] reassembles the windows and masks out-of-coverage cells.
//! 5. A [`Renderer`] receives the finished sequence.
//!
//! [`pipeline::NowcastPipeline`] drives the whole sequence.

pub mod coordinator;
pub mod error;
pub mod forecaster;
pub mod pipeline;
pub mod render;
pub mod selector;
pub mod stitch;
pub mod store;
pub mod tiling;
pub mod types;
pub mod verification;

pub use coordinator::{TilingCoordinator, WindowForecast};
pub use error::{FailureState, NowcastError, NowcastResult};
pub use forecaster::{build_forecaster, CommandForecaster, Forecaster, PersistenceForecaster};
pub use pipeline::{run_once, GridForecast, NowcastPipeline, RunReport, RunState};
pub use render::{ArrayArtifactWriter, RenderRequest, RenderedArtifact, Renderer};
pub use selector::{frame_path, FramePaths, TemporalWindow};
pub use stitch::{apply_mask, stitch};
pub use store::{FrameStore, LoadedInputs};
pub use tiling::{plan_windows, WindowSpec};
pub use types::{ForecastSequence, FrameStack, RadarFrame, ValidityMask};
pub use verification::{score_forecast, LeadTimeScore};
