//! Command-line flags. Every flag that mirrors a config field overrides the
//! value loaded from `--config`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use motion_grid::MotionGridConfig;
use motion_grid::config::ReferenceMode;

#[derive(Parser, Debug)]
#[command(
    name = "motion_grid_sender",
    about = "Streams the dominant motion cell of a video feed as OSC messages",
    version
)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Play back a directory of still images instead of a camera
    #[arg(long, conflicts_with = "camera")]
    pub frames_dir: Option<PathBuf>,

    /// Restart the image sequence when it runs out
    #[arg(long = "loop", requires = "frames_dir")]
    pub looping: bool,

    /// Camera device index (needs the `camera` feature)
    #[arg(long)]
    pub camera: Option<i32>,

    /// Keep the latest overlay PNG at this path (metadata goes next to it as .json)
    #[arg(long)]
    pub overlay_out: Option<PathBuf>,

    /// Show the camera feed in a window; the space bar captures the background
    #[arg(long, requires = "camera")]
    pub window: bool,

    #[arg(long)]
    pub dest_host: Option<String>,

    #[arg(long)]
    pub dest_port: Option<u16>,

    #[arg(long)]
    pub local_port: Option<u16>,

    /// Number of vertical cells
    #[arg(long)]
    pub cells: Option<u32>,

    /// Intensity difference that counts as motion (0-255)
    #[arg(long)]
    pub threshold: Option<u8>,

    /// Ticks per second
    #[arg(long)]
    pub tick_hz: Option<f64>,

    #[arg(long, value_enum)]
    pub reference: Option<ReferenceArg>,

    /// Also send the elapsed-frames message every tick
    #[arg(long)]
    pub elapsed_frames: bool,

    /// Also send the elapsed-seconds message every tick
    #[arg(long)]
    pub elapsed_seconds: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReferenceArg {
    Background,
    PreviousFrame,
}

impl From<ReferenceArg> for ReferenceMode {
    fn from(arg: ReferenceArg) -> Self {
        match arg {
            ReferenceArg::Background => ReferenceMode::Background,
            ReferenceArg::PreviousFrame => ReferenceMode::PreviousFrame,
        }
    }
}

impl Cli {
    pub fn apply(&self, config: &mut MotionGridConfig) {
        if let Some(host) = &self.dest_host {
            config.transport.dest_host = host.clone();
        }
        if let Some(port) = self.dest_port {
            config.transport.dest_port = port;
        }
        if let Some(port) = self.local_port {
            config.transport.local_port = port;
        }
        if let Some(cells) = self.cells {
            config.pipeline.cell_count = cells;
        }
        if let Some(threshold) = self.threshold {
            config.pipeline.diff_threshold = threshold;
        }
        if let Some(hz) = self.tick_hz {
            config.driver.tick_hz = hz;
        }
        if let Some(reference) = self.reference {
            config.pipeline.reference_mode = reference.into();
        }
        config.transport.send_elapsed_frames |= self.elapsed_frames;
        config.transport.send_elapsed_seconds |= self.elapsed_seconds;
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        config.logging.json |= self.json_logs;
        // A looping sequence never runs out.
        if self.looping {
            config.driver.stop_when_exhausted = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config() {
        let cli = Cli::try_parse_from([
            "motion_grid_sender",
            "--frames-dir",
            "frames",
            "--loop",
            "--dest-port",
            "9000",
            "--cells",
            "8",
            "--reference",
            "previous-frame",
            "--elapsed-frames",
            "-v",
        ])
        .unwrap();

        let mut config = MotionGridConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.transport.dest_port, 9000);
        assert_eq!(config.transport.dest_host, "127.0.0.1");
        assert_eq!(config.pipeline.cell_count, 8);
        assert_eq!(config.pipeline.reference_mode, ReferenceMode::PreviousFrame);
        assert!(config.transport.send_elapsed_frames);
        assert!(!config.transport.send_elapsed_seconds);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.driver.stop_when_exhausted);
    }

    #[test]
    fn no_flags_leave_the_config_alone() {
        let cli = Cli::try_parse_from(["motion_grid_sender"]).unwrap();
        let mut config = MotionGridConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, MotionGridConfig::default());
    }

    #[test]
    fn frames_dir_and_camera_are_exclusive() {
        assert!(
            Cli::try_parse_from(["motion_grid_sender", "--frames-dir", "x", "--camera", "0"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["motion_grid_sender", "--loop"]).is_err());
    }
}
