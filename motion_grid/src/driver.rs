// THEORY:
// The driver is the scheduling loop around `MotionPipeline`. It is the only
// async part of the engine and the only part that touches the network.
//
// Per tick: poll the source (never blocking), drain the event queue, run the
// pipeline, emit the square message, optionally emit the elapsed-time
// messages, and offer the report to an observer (a renderer, a test). The
// loop ends on the shutdown signal, or once a finite source is exhausted.
//
// Failed frame acquisition never leaves this loop as an error: the pipeline
// skips that cycle and the next tick polls again. Failed sends are logged and
// counted. Anything else (bad configuration, frames of the wrong size) stops
// the loop.

use crate::config::MotionGridConfig;
use crate::error::MotionResult;
use crate::osc::OscMessage;
use crate::pipeline::{MotionPipeline, PipelineEvent, TickOutcome, TickReport};
use crate::source::FrameSource;
use crate::transport::OscSender;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Scheduling and emission settings for `run`.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub tick_period: Duration,
    pub square_address: String,
    /// Address for the elapsed-frames message, if it should be sent.
    pub elapsed_frames_address: Option<String>,
    /// Address for the elapsed-seconds message, if it should be sent.
    pub elapsed_seconds_address: Option<String>,
    pub stop_when_exhausted: bool,
}

impl DriverSettings {
    /// Builds settings from the config, validating every OSC address up front.
    pub fn from_config(config: &MotionGridConfig) -> MotionResult<Self> {
        config.driver.validate()?;
        let transport = &config.transport;

        OscMessage::new(transport.square_address.as_str())?;
        let elapsed_frames_address = if transport.send_elapsed_frames {
            OscMessage::new(transport.elapsed_frames_address.as_str())?;
            Some(transport.elapsed_frames_address.clone())
        } else {
            None
        };
        let elapsed_seconds_address = if transport.send_elapsed_seconds {
            OscMessage::new(transport.elapsed_seconds_address.as_str())?;
            Some(transport.elapsed_seconds_address.clone())
        } else {
            None
        };

        Ok(Self {
            tick_period: config.driver.tick_period(),
            square_address: transport.square_address.clone(),
            elapsed_frames_address,
            elapsed_seconds_address,
            stop_when_exhausted: config.driver.stop_when_exhausted,
        })
    }
}

/// Counters collected over one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub aggregated: u64,
    pub acquisition_failures: u64,
    pub send_failures: u64,
}

/// Runs the tick loop until shutdown or source exhaustion.
pub async fn run(
    pipeline: &mut MotionPipeline,
    source: &mut dyn FrameSource,
    sender: &OscSender,
    events: &mut mpsc::UnboundedReceiver<PipelineEvent>,
    settings: &DriverSettings,
    observer: Option<mpsc::Sender<TickReport>>,
    mut shutdown: watch::Receiver<bool>,
) -> MotionResult<RunSummary> {
    let mut interval = tokio::time::interval(settings.tick_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let mut summary = RunSummary::default();
    info!(period_ms = settings.tick_period.as_millis() as u64, "tick loop started");

    let mut shutdown_open = true;
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed(), if shutdown_open => {
                if changed.is_err() {
                    debug!("shutdown sender dropped, running until the source is exhausted");
                    shutdown_open = false;
                }
                continue;
            }
        }

        let poll = source.poll_frame();
        let mut pending = Vec::new();
        while let Ok(event) = events.try_recv() {
            pending.push(event);
        }

        let report = pipeline.tick(poll, pending)?;
        summary.ticks += 1;
        match report.outcome {
            TickOutcome::Aggregated => summary.aggregated += 1,
            TickOutcome::AcquisitionFailed => summary.acquisition_failures += 1,
            _ => {}
        }

        emit(sender, settings, &report, started, &mut summary).await?;

        if let Some(observer) = &observer {
            if observer.try_send(report).is_err() {
                debug!("observer busy, dropping tick report");
            }
        }

        if settings.stop_when_exhausted && source.is_exhausted() {
            info!(ticks = summary.ticks, "frame source exhausted");
            break;
        }
    }

    info!(
        ticks = summary.ticks,
        aggregated = summary.aggregated,
        acquisition_failures = summary.acquisition_failures,
        send_failures = summary.send_failures,
        "tick loop stopped"
    );
    Ok(summary)
}

async fn emit(
    sender: &OscSender,
    settings: &DriverSettings,
    report: &TickReport,
    started: Instant,
    summary: &mut RunSummary,
) -> MotionResult<()> {
    let mut results = vec![sender.send_signal(&settings.square_address, &report.signal).await];
    if let Some(address) = &settings.elapsed_frames_address {
        results.push(sender.send_float(address, report.tick as f32).await);
    }
    if let Some(address) = &settings.elapsed_seconds_address {
        results.push(sender.send_float(address, started.elapsed().as_secs_f32()).await);
    }

    for result in results {
        match result {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => {
                summary.send_failures += 1;
                warn!(tick = report.tick, error = %err, "failed to send OSC message");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
