// THEORY:
// Camera sensors never produce the same value twice for a static scene. The
// `blur` module removes that per-pixel flicker before frames are compared, so
// that the differencing stage reacts to shapes moving rather than to noise.
//
// The kernel is a separable Gaussian: one horizontal pass, one vertical pass,
// both run by `imageproc`. Small odd sizes use the exact binomial tables
// (5 -> [1, 4, 6, 4, 1] / 16); larger sizes sample a Gaussian whose sigma is
// derived from the size. Borders replicate the edge sample, so a constant
// image stays constant after blurring.

use crate::error::{MotionError, MotionResult};
use image::GrayImage;
use imageproc::filter::separable_filter_equal;

/// A normalized, odd-sized 1D Gaussian applied along both axes.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f32>,
}

impl GaussianKernel {
    pub fn new(size: u32) -> MotionResult<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(MotionError::config(format!(
                "blur kernel size must be a positive odd number, got {}",
                size
            )));
        }

        let weights = match size {
            1 => vec![1.0],
            3 => vec![0.25, 0.5, 0.25],
            5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => vec![
                0.031_25, 0.109_375, 0.218_75, 0.281_25, 0.218_75, 0.109_375, 0.031_25,
            ],
            _ => Self::sampled(size),
        };

        Ok(Self { weights })
    }

    fn sampled(size: u32) -> Vec<f32> {
        let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
        let radius = (size / 2) as f64;
        let raw: Vec<f64> = (0..size)
            .map(|i| {
                let d = i as f64 - radius;
                (-(d * d) / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|w| (w / total) as f32).collect()
    }

    pub fn size(&self) -> u32 {
        self.weights.len() as u32
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Blurs a frame. An empty frame yields an empty frame.
    pub fn apply(&self, frame: &GrayImage) -> GrayImage {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return GrayImage::new(width, height);
        }
        if self.weights.len() == 1 {
            return frame.clone();
        }
        separable_filter_equal(frame, self.weights.as_slice())
    }
}

impl Default for GaussianKernel {
    /// The 5x5 binomial kernel.
    fn default() -> Self {
        Self {
            weights: vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        }
    }
}
