// THEORY:
// `MotionSignal` is the compact, per-tick answer of the whole engine: how much
// motion the dominant cell saw and where that cell sits on the canvas. It is a
// plain value, recomputed every cycle from the aggregator and never smoothed.

use crate::error::MotionResult;
use crate::osc::OscMessage;
use serde::{Deserialize, Serialize};

/// The dominant cell's changed-pixel count and normalized position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSignal {
    /// Changed-pixel count of the winning cell.
    pub motion_value: u64,
    /// Winning cell midpoint x, as a fraction of canvas width.
    pub max_x: f32,
    /// Winning cell midpoint y, as a fraction of canvas height.
    pub max_y: f32,
}

impl MotionSignal {
    pub fn zero() -> Self {
        Self {
            motion_value: 0,
            max_x: 0.0,
            max_y: 0.0,
        }
    }

    pub fn from_cell(motion_value: u64, centroid: (f32, f32)) -> Self {
        Self {
            motion_value,
            max_x: centroid.0,
            max_y: centroid.1,
        }
    }

    /// Builds the three-float wire message: motion value, x, y.
    pub fn to_osc(&self, address: &str) -> MotionResult<OscMessage> {
        Ok(OscMessage::new(address)?
            .with_float(self.motion_value as f32)
            .with_float(self.max_x)
            .with_float(self.max_y))
    }
}

impl Default for MotionSignal {
    fn default() -> Self {
        Self::zero()
    }
}
