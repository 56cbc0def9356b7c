// THEORY:
// A `FrameSource` is anything that can hand the pipeline a new frame when asked.
// Polling never blocks: `Ok(None)` means "nothing new this tick" and the
// pipeline carries on with the frame it already has, while `Err` means the
// source is unavailable right now and the tick is skipped. There is no retry
// logic here; the next tick simply polls again.
//
// Sources always return frames already converted to the canvas (single channel,
// canvas resolution), so the core never sees a foreign pixel layout.

use crate::core_modules::frame::frame;
use crate::error::{MotionError, MotionResult};
use image::GrayImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "pgm", "ppm", "tif", "tiff", "webp"];

/// Non-blocking provider of canvas-sized grayscale frames.
pub trait FrameSource: Send {
    /// Returns the next frame if one is ready.
    fn poll_frame(&mut self) -> MotionResult<Option<GrayImage>>;

    /// True once a finite source has delivered its last frame.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Plays back a directory of still images in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
    looping: bool,
    canvas_width: u32,
    canvas_height: u32,
}

impl ImageSequenceSource {
    pub fn open(
        dir: impl AsRef<Path>,
        canvas_width: u32,
        canvas_height: u32,
        looping: bool,
    ) -> MotionResult<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            MotionError::acquisition(format!("cannot read {}: {}", dir.display(), e))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(MotionError::acquisition(format!(
                "no images found in {}",
                dir.display()
            )));
        }

        info!(dir = %dir.display(), frames = paths.len(), looping, "opened image sequence");
        Ok(Self {
            paths,
            position: 0,
            looping,
            canvas_width,
            canvas_height,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn poll_frame(&mut self) -> MotionResult<Option<GrayImage>> {
        if self.position >= self.paths.len() {
            if !self.looping {
                return Ok(None);
            }
            self.position = 0;
        }

        let path = &self.paths[self.position];
        self.position += 1;

        let decoded = image::open(path).map_err(|e| {
            MotionError::acquisition(format!("failed to decode {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "loaded frame");
        Ok(Some(frame::to_canvas(
            &decoded,
            self.canvas_width,
            self.canvas_height,
        )))
    }

    fn is_exhausted(&self) -> bool {
        !self.looping && self.position >= self.paths.len()
    }
}

/// What a `MemorySource` yields on one poll.
#[derive(Debug, Clone)]
pub enum Scripted {
    Frame(GrayImage),
    Nothing,
    Failure(String),
}

/// Replays a scripted sequence of polls from memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    script: VecDeque<Scripted>,
}

impl MemorySource {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn from_frames(frames: impl IntoIterator<Item = GrayImage>) -> Self {
        Self::new(frames.into_iter().map(Scripted::Frame))
    }

    pub fn push(&mut self, step: Scripted) {
        self.script.push_back(step);
    }
}

impl FrameSource for MemorySource {
    fn poll_frame(&mut self) -> MotionResult<Option<GrayImage>> {
        match self.script.pop_front() {
            Some(Scripted::Frame(frame)) => Ok(Some(frame)),
            Some(Scripted::Nothing) | None => Ok(None),
            Some(Scripted::Failure(message)) => Err(MotionError::acquisition(message)),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.script.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "motion_grid_source_{}_{}",
            name,
            std::process::id()
        ));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sequence_plays_in_name_order_and_fits_canvas() {
        let dir = temp_dir("order");
        RgbImage::from_pixel(20, 10, Rgb([255, 255, 255]))
            .save(dir.join("b.png"))
            .unwrap();
        RgbImage::from_pixel(20, 10, Rgb([0, 0, 0]))
            .save(dir.join("a.png"))
            .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(&dir, 10, 5, false).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.poll_frame().unwrap().unwrap();
        assert_eq!(first.dimensions(), (10, 5));
        assert_eq!(first.get_pixel(0, 0), &Luma([0]));
        let second = source.poll_frame().unwrap().unwrap();
        assert_eq!(second.get_pixel(0, 0), &Luma([255]));

        assert!(source.is_exhausted());
        assert!(source.poll_frame().unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn looping_sequence_wraps_around() {
        let dir = temp_dir("loop");
        GrayImage::from_pixel(4, 4, Luma([7])).save(dir.join("only.png")).unwrap();

        let mut source = ImageSequenceSource::open(&dir, 4, 4, true).unwrap();
        for _ in 0..3 {
            assert_eq!(source.poll_frame().unwrap().unwrap().get_pixel(1, 1), &Luma([7]));
            assert!(!source.is_exhausted());
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_directory_is_unavailable() {
        let dir = temp_dir("empty");
        let err = ImageSequenceSource::open(&dir, 4, 4, false).unwrap_err();
        assert!(matches!(err, MotionError::AcquisitionUnavailable { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn undecodable_file_is_unavailable_for_that_poll() {
        let dir = temp_dir("corrupt");
        std::fs::write(dir.join("broken.png"), b"not a png").unwrap();
        let mut source = ImageSequenceSource::open(&dir, 4, 4, false).unwrap();
        assert!(matches!(
            source.poll_frame(),
            Err(MotionError::AcquisitionUnavailable { .. })
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn memory_source_follows_its_script() {
        let mut source = MemorySource::new([
            Scripted::Frame(GrayImage::new(2, 2)),
            Scripted::Nothing,
            Scripted::Failure("unplugged".into()),
        ]);
        assert!(source.poll_frame().unwrap().is_some());
        assert!(source.poll_frame().unwrap().is_none());
        assert!(source.poll_frame().is_err());
        assert!(source.is_exhausted());
        assert!(source.poll_frame().unwrap().is_none());
    }
}
