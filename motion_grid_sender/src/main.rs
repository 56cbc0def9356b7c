// THEORY:
// `motion_grid_sender` wires the engine to the outside world: a frame source,
// a keyboard, a UDP destination and an optional overlay file. All of the
// computation lives in `motion_grid`; this binary only builds collaborators
// from the configuration and runs the tick loop until the user quits.
//
// Startup is fail-fast: a bad configuration, an unopenable source or a port
// that cannot be bound ends the process before the first tick.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use motion_grid::driver::{self, DriverSettings};
use motion_grid::source::{FrameSource, ImageSequenceSource};
use motion_grid::transport::OscSender;
use motion_grid::{MotionGridConfig, MotionPipeline, PipelineEvent, TickReport};
use motion_grid_visualizer::{FrameBus, OverlayRenderer, spawn_overlay_writer};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[cfg(feature = "camera")]
mod camera;
#[cfg_attr(not(feature = "camera"), allow(dead_code))]
mod capture;
mod cli;
mod input;
mod logging;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MotionGridConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => MotionGridConfig::default(),
    };
    cli.apply(&mut config);
    logging::init_logging(&config.logging);

    let mut pipeline = match MotionPipeline::new(config.pipeline.clone()) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!(error = %err, "invalid pipeline configuration");
            return Err(err.into());
        }
    };
    let settings = DriverSettings::from_config(&config).context("invalid driver configuration")?;

    let sender = match OscSender::from_config(&config.transport).await {
        Ok(sender) => sender,
        Err(err) => {
            error!(error = %err, "could not bind the OSC sender");
            return Err(err.into());
        }
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut source = open_source(&cli, &config, events_tx.clone(), &shutdown_tx, &shutdown_rx)?;

    input::spawn_stdin_reader(events_tx, shutdown_tx.clone());
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down");
                shutdown_tx.send(true).ok();
            }
        });
    }
    info!("press enter (or type b) to capture the background, q to quit");

    let (observer, overlay_tasks) = match cli.overlay_out.clone() {
        Some(path) => {
            let (tx, tasks) = start_overlay(&config, path)?;
            (Some(tx), Some(tasks))
        }
        None => (None, None),
    };

    let summary = driver::run(
        &mut pipeline,
        source.as_mut(),
        &sender,
        &mut events_rx,
        &settings,
        observer,
        shutdown_rx,
    )
    .await;

    if let Some((renderer, writer)) = overlay_tasks {
        renderer.await.ok();
        writer.await.ok();
    }

    match summary {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                aggregated = summary.aggregated,
                acquisition_failures = summary.acquisition_failures,
                send_failures = summary.send_failures,
                "done"
            );
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "tick loop failed");
            Err(err.into())
        }
    }
}

fn open_source(
    cli: &Cli,
    config: &MotionGridConfig,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    shutdown_tx: &watch::Sender<bool>,
    shutdown_rx: &watch::Receiver<bool>,
) -> anyhow::Result<Box<dyn FrameSource>> {
    let pipeline = &config.pipeline;

    if let Some(dir) = &cli.frames_dir {
        let source =
            ImageSequenceSource::open(dir, pipeline.canvas_width, pipeline.canvas_height, cli.looping)
                .with_context(|| format!("failed to open frames in {}", dir.display()))?;
        return Ok(Box::new(source));
    }

    #[cfg(feature = "camera")]
    {
        let options = camera::CameraOptions {
            device: cli.camera.unwrap_or(0),
            canvas_width: pipeline.canvas_width,
            canvas_height: pipeline.canvas_height,
            window: cli.window,
        };
        let source = camera::OpenCvCameraSource::open(
            options,
            events_tx,
            shutdown_tx.clone(),
            shutdown_rx.clone(),
        )
        .context("failed to open the camera")?;
        Ok(Box::new(source))
    }

    #[cfg(not(feature = "camera"))]
    {
        let _ = (events_tx, shutdown_tx, shutdown_rx);
        if cli.camera.is_some() {
            anyhow::bail!("this build has no camera support; rebuild with --features camera");
        }
        anyhow::bail!("no frame source: pass --frames-dir <DIR>")
    }
}

/// Starts the render task and the file writer behind `--overlay-out`.
fn start_overlay(
    config: &MotionGridConfig,
    path: PathBuf,
) -> anyhow::Result<(mpsc::Sender<TickReport>, (JoinHandle<()>, JoinHandle<()>))> {
    let mut renderer = OverlayRenderer::new(&config.pipeline)?;
    let bus = FrameBus::new(4);
    let writer = spawn_overlay_writer(&bus, path);

    let (tx, mut rx) = mpsc::channel::<TickReport>(4);
    let render = tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            if let Err(err) = renderer.publish(&bus, &report) {
                warn!(tick = report.tick, error = %err, "failed to render overlay");
            }
        }
    });
    Ok((tx, (render, writer)))
}
