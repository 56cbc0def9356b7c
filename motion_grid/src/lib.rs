// THEORY:
// This file is the main entry point for the `motion_grid` library crate. It
// exposes the engine that turns a live video stream into one compact motion
// message per tick:
//
//   frame -> FrameDiffer -> ChangeMask -> GridAggregator -> MotionSignal -> OSC
//
// The pixel-level work lives in `core_modules`. Around it sit the thin
// collaborators: `source` (where frames come from), `transport` and `osc`
// (where the signal goes), `pipeline` (per-session state, one cycle per tick)
// and `driver` (the async loop that schedules ticks).

pub mod config;
pub mod core_modules;
pub mod driver;
pub mod error;
pub mod osc;
pub mod pipeline;
pub mod source;
pub mod transport;

pub use config::{MotionGridConfig, PipelineConfig};
pub use core_modules::frame_differ::{ChangeMask, FrameDiffer};
pub use core_modules::grid::{Cell, Grid, Rect};
pub use core_modules::grid_aggregator::{CellMotion, GridAggregator};
pub use core_modules::motion_signal::MotionSignal;
pub use error::{MotionError, MotionResult};
pub use pipeline::{MotionPipeline, PipelineEvent, TickOutcome, TickReport};
