//! Engine configuration.
//!
//! Every value has a default, so an empty JSON object is a valid config file.
//! Values are fixed for the lifetime of a session.

use crate::core_modules::frame_differ::{DEFAULT_KERNEL_SIZE, DEFAULT_THRESHOLD};
use crate::core_modules::grid::{DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_CELL_COUNT};
use crate::error::{MotionError, MotionResult};
use crate::osc::{ELAPSED_FRAMES_ADDR, ELAPSED_SECS_ADDR, SQUARE_ADDR};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration, one section per collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionGridConfig {
    pub pipeline: PipelineConfig,
    pub transport: TransportConfig,
    pub driver: DriverConfig,
    pub logging: LoggingConfig,
}

/// Which frame the current frame is differenced against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// The user-captured background snapshot.
    #[default]
    Background,
    /// The raw frame seen on the previous new-frame tick.
    PreviousFrame,
}

/// What the emitted signal does on a tick whose frame acquisition failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFramePolicy {
    /// Keep emitting the last computed signal.
    #[default]
    Hold,
    /// Emit a zeroed signal.
    Zero,
}

/// Geometry and thresholds of the motion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Number of vertical cells the canvas is divided into.
    pub cell_count: u32,
    /// Minimum absolute intensity difference (0-255) that marks a change.
    pub diff_threshold: u8,
    /// Side length of the Gaussian smoothing kernel; must be odd.
    pub blur_kernel_size: u32,
    pub reference_mode: ReferenceMode,
    pub missing_frame_policy: MissingFramePolicy,
}

/// Outbound OSC/UDP settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Local UDP port the sender binds to.
    pub local_port: u16,
    pub dest_host: String,
    pub dest_port: u16,
    pub square_address: String,
    pub elapsed_frames_address: String,
    pub elapsed_seconds_address: String,
    pub send_elapsed_frames: bool,
    pub send_elapsed_seconds: bool,
}

/// Scheduling of the tick loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Ticks per second.
    pub tick_hz: f64,
    /// Stop the loop once a finite source runs out of frames.
    pub stop_when_exhausted: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "motion_grid=debug,warn").
    pub level: String,
    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            cell_count: DEFAULT_CELL_COUNT,
            diff_threshold: DEFAULT_THRESHOLD,
            blur_kernel_size: DEFAULT_KERNEL_SIZE,
            reference_mode: ReferenceMode::default(),
            missing_frame_policy: MissingFramePolicy::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            local_port: 8887,
            dest_host: "127.0.0.1".to_string(),
            dest_port: 8888,
            square_address: SQUARE_ADDR.to_string(),
            elapsed_frames_address: ELAPSED_FRAMES_ADDR.to_string(),
            elapsed_seconds_address: ELAPSED_SECS_ADDR.to_string(),
            send_elapsed_frames: false,
            send_elapsed_seconds: false,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_hz: 30.0,
            stop_when_exhausted: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl MotionGridConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> MotionResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MotionError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MotionResult<()> {
        self.pipeline.validate()?;
        self.driver.validate()?;
        Ok(())
    }
}

impl PipelineConfig {
    /// Checks the values that would otherwise fail later, at setup time.
    pub fn validate(&self) -> MotionResult<()> {
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(MotionError::config(format!(
                "canvas must be non-empty, got {}x{}",
                self.canvas_width, self.canvas_height
            )));
        }
        if self.cell_count == 0 || self.cell_count > self.canvas_width {
            return Err(MotionError::config(format!(
                "cell_count must be in 1..={}, got {}",
                self.canvas_width, self.cell_count
            )));
        }
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return Err(MotionError::config(format!(
                "blur_kernel_size must be a positive odd number, got {}",
                self.blur_kernel_size
            )));
        }
        Ok(())
    }
}

impl DriverConfig {
    pub fn validate(&self) -> MotionResult<()> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(MotionError::config(format!(
                "tick_hz must be a positive number, got {}",
                self.tick_hz
            )));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_hz)
    }
}
