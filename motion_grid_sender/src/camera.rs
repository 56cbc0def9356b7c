// THEORY:
// `VideoCapture::read` blocks until the device delivers a frame, so the camera
// lives on its own thread and hands converted frames to the tick loop through a
// single-value slot. `poll_frame` takes whatever is newest, which keeps the
// source non-blocking and never lets stale frames queue up.
//
// A failed read is published like a frame, then the thread waits one frame
// period before trying again. After a run of failures it gives up, and the
// source reports itself unavailable from then on.
//
// With a window enabled the same thread shows the feed and reads the keyboard:
// space captures the background, `q` or Escape stops the run.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use image::GrayImage;
use motion_grid::core_modules::frame::frame;
use motion_grid::source::FrameSource;
use motion_grid::{MotionError, MotionResult, PipelineEvent};
use opencv::{
    core::Mat,
    highgui,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tokio::sync::{mpsc as tokio_mpsc, watch};
use tracing::{info, warn};

use crate::capture::{AfterFailure, LatestSlot, ReadFailures};

const WINDOW: &str = "motion_grid";
const KEY_SPACE: i32 = b' ' as i32;
const KEY_Q: i32 = b'q' as i32;
const KEY_ESC: i32 = 27;
const FRAME_PERIOD: Duration = Duration::from_millis(33);
const MAX_CONSECUTIVE_FAILURES: u32 = 90;

pub struct CameraOptions {
    pub device: i32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub window: bool,
}

pub struct OpenCvCameraSource {
    latest: Arc<LatestSlot<MotionResult<GrayImage>>>,
    thread: JoinHandle<()>,
}

impl OpenCvCameraSource {
    /// Opens the device and starts the capture thread. Fails if the device
    /// cannot be opened.
    pub fn open(
        options: CameraOptions,
        events: tokio_mpsc::UnboundedSender<PipelineEvent>,
        shutdown_tx: watch::Sender<bool>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> MotionResult<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<MotionResult<()>>();
        let latest = Arc::new(LatestSlot::new());
        let slot = latest.clone();

        let thread = std::thread::spawn(move || {
            let mut capture = match open_device(options.device, options.window) {
                Ok(capture) => {
                    ready_tx.send(Ok(())).ok();
                    capture
                }
                Err(err) => {
                    ready_tx.send(Err(err)).ok();
                    return;
                }
            };

            let mut failures = ReadFailures::new(MAX_CONSECUTIVE_FAILURES, FRAME_PERIOD);
            let mut raw = Mat::default();
            // The source holds the other reference; once it is dropped nobody reads.
            while !*shutdown_rx.borrow() && Arc::strong_count(&slot) > 1 {
                match read_frame(&mut capture, &mut raw) {
                    Ok(gray) => {
                        failures.record_success();
                        slot.put(Ok(frame::fit_to_canvas(
                            gray,
                            options.canvas_width,
                            options.canvas_height,
                        )));
                    }
                    Err(err) => {
                        slot.put(Err(err));
                        match failures.record_failure() {
                            AfterFailure::Retry(wait) => {
                                std::thread::sleep(wait);
                                continue;
                            }
                            AfterFailure::GiveUp => {
                                warn!(
                                    device = options.device,
                                    failures = failures.consecutive(),
                                    "camera keeps failing, giving up"
                                );
                                break;
                            }
                        }
                    }
                }

                if options.window {
                    if let Err(err) = show(&raw) {
                        warn!(error = %err, "failed to show camera frame");
                    }
                    match highgui::wait_key(1) {
                        Ok(KEY_SPACE) => {
                            events.send(PipelineEvent::CaptureBackground).ok();
                        }
                        Ok(KEY_Q) | Ok(KEY_ESC) => {
                            info!("quit requested from camera window");
                            shutdown_tx.send(true).ok();
                            break;
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "failed to poll camera window keys"),
                    }
                }
            }
            if options.window {
                highgui::destroy_all_windows().ok();
            }
        });

        ready_rx
            .recv()
            .map_err(|_| MotionError::acquisition("camera thread exited during startup"))??;
        info!(device = options.device, "camera opened");

        Ok(Self { latest, thread })
    }
}

impl FrameSource for OpenCvCameraSource {
    fn poll_frame(&mut self) -> MotionResult<Option<GrayImage>> {
        match self.latest.take() {
            Some(result) => result.map(Some),
            None if self.thread.is_finished() => {
                Err(MotionError::acquisition("camera thread stopped"))
            }
            None => Ok(None),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.thread.is_finished()
    }
}

fn open_device(device: i32, window: bool) -> MotionResult<VideoCapture> {
    let capture = VideoCapture::new(device, videoio::CAP_ANY).map_err(cv_error)?;
    if !capture.is_opened().map_err(cv_error)? {
        return Err(MotionError::acquisition(format!(
            "camera device {} could not be opened",
            device
        )));
    }
    if window {
        highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE).map_err(cv_error)?;
    }
    Ok(capture)
}

fn read_frame(capture: &mut VideoCapture, raw: &mut Mat) -> MotionResult<GrayImage> {
    if !capture.read(raw).map_err(cv_error)? || raw.empty() {
        return Err(MotionError::acquisition("camera returned no frame"));
    }
    if raw.channels() != 3 {
        return Err(MotionError::acquisition(format!(
            "expected a 3-channel BGR frame, got {} channels",
            raw.channels()
        )));
    }
    let width = raw.cols() as u32;
    let height = raw.rows() as u32;
    frame::luma_from_bgr(width, height, raw.data_bytes().map_err(cv_error)?)
}

fn show(raw: &Mat) -> opencv::Result<()> {
    if raw.empty() {
        return Ok(());
    }
    highgui::imshow(WINDOW, raw)
}

fn cv_error(err: opencv::Error) -> MotionError {
    MotionError::acquisition(err.to_string())
}
