// THEORY:
// The `pipeline` module is the top-level API of the engine. `MotionPipeline`
// owns every piece of per-session state (the current frame, the background
// snapshot, the aggregator and the last emitted signal) and advances it one
// tick at a time. Nothing is held in process-wide state.
//
// One tick, in order:
// 1.  **Acquire**: a new frame replaces the current one; no new frame keeps the
//     stale one; an acquisition failure skips the cycle and applies the
//     configured missing-frame policy to the signal.
// 2.  **Events**: queued discrete events are applied in arrival order. The only
//     event is "capture background", which stores a blurred copy of the
//     current frame as the new reference in a single assignment.
// 3.  **Difference**: with both a reference and a current frame, the
//     `FrameDiffer` produces a change mask.
// 4.  **Aggregate**: a non-empty mask is handed to the `GridAggregator` and the
//     signal is refreshed from it.
// 5.  **Report**: every tick yields a signal to emit, even when nothing could
//     be computed (the previous signal, or `{0, centroid of cell 0}` before
//     the first aggregation).

use crate::config::{MissingFramePolicy, PipelineConfig, ReferenceMode};
use crate::core_modules::frame_differ::{ChangeMask, FrameDiffer};
use crate::core_modules::grid_aggregator::GridAggregator;
use crate::core_modules::motion_signal::MotionSignal;
use crate::error::{MotionError, MotionResult};
use image::GrayImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A discrete input consumed by the pipeline once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Snapshot the current frame as the differencing reference.
    CaptureBackground,
}

/// How a tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A mask was computed and aggregated.
    Aggregated,
    /// No frame has been received yet.
    NoFrame,
    /// No reference frame exists yet (no background captured).
    NoReference,
    /// The differ returned an empty mask.
    EmptyMask,
    /// The frame source failed this tick.
    AcquisitionFailed,
}

/// The result of one tick, ready for the transport and any renderer.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// 1-based tick counter.
    pub tick: u64,
    pub outcome: TickOutcome,
    /// The signal to emit for this tick.
    pub signal: MotionSignal,
    /// Whether a new frame arrived this tick.
    pub new_frame: bool,
    /// Whether a background was captured this tick.
    pub background_captured: bool,
    /// The change mask computed this tick, if any.
    pub mask: Option<ChangeMask>,
}

/// The main, top-level struct for the motion engine.
pub struct MotionPipeline {
    config: PipelineConfig,
    differ: FrameDiffer,
    aggregator: GridAggregator,
    background: Option<Arc<GrayImage>>,
    current: Option<GrayImage>,
    previous: Option<GrayImage>,
    signal: MotionSignal,
    ticks: u64,
}

impl MotionPipeline {
    /// Validates the configuration and builds the grid. Fails before any tick
    /// runs if the configuration is unusable.
    pub fn new(config: PipelineConfig) -> MotionResult<Self> {
        config.validate()?;
        let differ = FrameDiffer::new(config.blur_kernel_size, config.diff_threshold)?;
        let aggregator =
            GridAggregator::configure(config.canvas_width, config.canvas_height, config.cell_count)?;
        // Before the first aggregation the signal reads cell 0 with no motion.
        let signal = aggregator.signal();

        info!(
            canvas_width = config.canvas_width,
            canvas_height = config.canvas_height,
            cells = config.cell_count,
            threshold = config.diff_threshold,
            kernel = config.blur_kernel_size,
            reference = ?config.reference_mode,
            "motion pipeline configured"
        );

        Ok(Self {
            config,
            differ,
            aggregator,
            background: None,
            current: None,
            previous: None,
            signal,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &GridAggregator {
        &self.aggregator
    }

    pub fn signal(&self) -> MotionSignal {
        self.signal
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    /// Shared handle to the current background snapshot.
    pub fn background(&self) -> Option<Arc<GrayImage>> {
        self.background.clone()
    }

    pub fn current_frame(&self) -> Option<&GrayImage> {
        self.current.as_ref()
    }

    /// Applies one discrete event. Returns true if a background was captured.
    pub fn handle_event(&mut self, event: PipelineEvent) -> bool {
        match event {
            PipelineEvent::CaptureBackground => self.capture_background(),
        }
    }

    /// Replaces the background with a blurred copy of the current frame.
    /// Without a current frame this is a no-op.
    pub fn capture_background(&mut self) -> bool {
        match &self.current {
            Some(frame) => {
                let snapshot = Arc::new(self.differ.prepare_background(frame));
                self.background = Some(snapshot);
                info!(tick = self.ticks, "background captured");
                true
            }
            None => {
                warn!("background capture requested before any frame arrived");
                false
            }
        }
    }

    /// Runs one cycle with the result of polling the frame source and the
    /// events queued since the previous tick.
    pub fn tick(
        &mut self,
        poll: MotionResult<Option<GrayImage>>,
        events: impl IntoIterator<Item = PipelineEvent>,
    ) -> MotionResult<TickReport> {
        self.ticks += 1;

        let (new_frame, acquisition_failed) = match poll {
            Ok(Some(frame)) => {
                self.accept_frame(frame)?;
                (true, false)
            }
            Ok(None) => (false, false),
            Err(err) if err.is_recoverable() => {
                warn!(tick = self.ticks, error = %err, "frame acquisition failed, skipping cycle");
                (false, true)
            }
            Err(err) => return Err(err),
        };

        let mut background_captured = false;
        for event in events {
            background_captured |= self.handle_event(event);
        }

        if acquisition_failed {
            if self.config.missing_frame_policy == MissingFramePolicy::Zero {
                self.signal = MotionSignal::zero();
            }
            return Ok(self.report(TickOutcome::AcquisitionFailed, new_frame, background_captured, None));
        }

        let Some(current) = self.current.as_ref() else {
            return Ok(self.report(TickOutcome::NoFrame, new_frame, background_captured, None));
        };

        let mask = match self.config.reference_mode {
            ReferenceMode::Background => match self.background.as_deref() {
                Some(reference) => Some(self.differ.difference(reference, current)?),
                None => None,
            },
            // The frame seen this tick is the reference for the next one, even
            // when it is a stale frame compared against itself.
            ReferenceMode::PreviousFrame => {
                let mask = match self.previous.as_ref() {
                    Some(reference) => Some(self.differ.difference(reference, current)?),
                    None => None,
                };
                self.previous = Some(current.clone());
                mask
            }
        };
        let Some(mask) = mask else {
            debug!(tick = self.ticks, "no reference frame yet, skipping differencing");
            return Ok(self.report(TickOutcome::NoReference, new_frame, background_captured, None));
        };

        if mask.is_empty() {
            return Ok(self.report(TickOutcome::EmptyMask, new_frame, background_captured, None));
        }

        self.aggregator.count_pixels(&mask)?;
        self.signal = self.aggregator.signal();
        debug!(
            tick = self.ticks,
            winner = self.aggregator.winner_index(),
            motion = self.signal.motion_value,
            "tick aggregated"
        );

        Ok(self.report(TickOutcome::Aggregated, new_frame, background_captured, Some(mask)))
    }

    fn accept_frame(&mut self, frame: GrayImage) -> MotionResult<()> {
        let canvas = (self.config.canvas_width, self.config.canvas_height);
        if frame.dimensions() != canvas {
            return Err(MotionError::dimension_mismatch(canvas, frame.dimensions()));
        }
        self.current = Some(frame);
        Ok(())
    }

    fn report(
        &self,
        outcome: TickOutcome,
        new_frame: bool,
        background_captured: bool,
        mask: Option<ChangeMask>,
    ) -> TickReport {
        TickReport {
            tick: self.ticks,
            outcome,
            signal: self.signal,
            new_frame,
            background_captured,
            mask,
        }
    }
}
