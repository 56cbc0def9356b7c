pub mod blur;
pub mod frame;
pub mod frame_differ;
pub mod grid;
pub mod grid_aggregator;
pub mod motion_signal;
