// THEORY:
// The `FrameDiffer` turns two frames into a yes/no answer per pixel: did this
// spot of the scene change relative to the reference? It is the first and only
// stage that looks at raw intensities; everything after it works on the binary
// `ChangeMask`.
//
// Algorithm, per call:
// 1.  **Smooth**: blur the current frame with the configured Gaussian kernel.
// 2.  **Compare**: absolute difference against the reference, sample by sample.
// 3.  **Decide**: a difference at or above the threshold marks the sample as
//     changed (255); anything below is unchanged (0).
//
// The reference is expected to have been smoothed the same way when it was
// captured (`prepare_background`). The differ is a pure function of its inputs
// and holds no state between calls.

use crate::core_modules::blur::GaussianKernel;
use crate::core_modules::frame::frame;
use crate::error::{MotionError, MotionResult};
use image::{GrayImage, Luma};

pub const CHANGED: u8 = 255;
pub const UNCHANGED: u8 = 0;

pub const DEFAULT_THRESHOLD: u8 = 50;
pub const DEFAULT_KERNEL_SIZE: u32 = 5;

/// A binary image where every sample is either `CHANGED` or `UNCHANGED`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMask {
    image: GrayImage,
}

impl ChangeMask {
    /// The "no data" mask.
    pub fn empty() -> Self {
        Self {
            image: GrayImage::new(0, 0),
        }
    }

    /// Wraps an existing image. Samples other than `CHANGED` count as unchanged.
    pub fn from_image(image: GrayImage) -> Self {
        Self { image }
    }

    pub fn is_empty(&self) -> bool {
        frame::is_empty(&self.image)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Total number of changed samples in the mask.
    pub fn changed_count(&self) -> u64 {
        self.image.as_raw().iter().filter(|&&v| v == CHANGED).count() as u64
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }
}

/// Produces change masks from a reference frame and the current frame.
#[derive(Debug, Clone)]
pub struct FrameDiffer {
    kernel: GaussianKernel,
    threshold: u8,
}

impl FrameDiffer {
    pub fn new(kernel_size: u32, threshold: u8) -> MotionResult<Self> {
        Ok(Self {
            kernel: GaussianKernel::new(kernel_size)?,
            threshold,
        })
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn kernel(&self) -> &GaussianKernel {
        &self.kernel
    }

    /// Applies the same smoothing used on the current frame, for storing a
    /// frame as the differencing reference.
    pub fn prepare_background(&self, frame: &GrayImage) -> GrayImage {
        self.kernel.apply(frame)
    }

    /// Computes the change mask of `current` against `reference`.
    ///
    /// Returns an empty mask when either input is empty, and fails when the
    /// two frames have different dimensions.
    pub fn difference(&self, reference: &GrayImage, current: &GrayImage) -> MotionResult<ChangeMask> {
        if frame::is_empty(reference) || frame::is_empty(current) {
            return Ok(ChangeMask::empty());
        }
        if reference.dimensions() != current.dimensions() {
            return Err(MotionError::dimension_mismatch(
                reference.dimensions(),
                current.dimensions(),
            ));
        }

        let smoothed = self.kernel.apply(current);
        let threshold = self.threshold;
        let mut mask = GrayImage::new(current.width(), current.height());

        for ((out, cur), reference) in mask
            .pixels_mut()
            .zip(smoothed.pixels())
            .zip(reference.pixels())
        {
            let delta = cur[0].abs_diff(reference[0]);
            *out = Luma([if delta >= threshold { CHANGED } else { UNCHANGED }]);
        }

        Ok(ChangeMask::from_image(mask))
    }
}

impl Default for FrameDiffer {
    fn default() -> Self {
        Self {
            kernel: GaussianKernel::default(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn differ() -> FrameDiffer {
        FrameDiffer::default()
    }

    #[test]
    fn identical_frames_produce_no_change() {
        let frame = GrayImage::from_pixel(20, 10, Luma([90]));
        let reference = differ().prepare_background(&frame);
        let mask = differ().difference(&reference, &frame).unwrap();
        assert_eq!(mask.dimensions(), (20, 10));
        assert_eq!(mask.changed_count(), 0);
    }

    #[test]
    fn large_uniform_change_marks_every_sample() {
        let reference = GrayImage::from_pixel(16, 16, Luma([0]));
        let current = GrayImage::from_pixel(16, 16, Luma([200]));
        let mask = differ().difference(&reference, &current).unwrap();
        assert_eq!(mask.changed_count(), 16 * 16);
    }

    #[test]
    fn threshold_is_inclusive() {
        let reference = GrayImage::from_pixel(8, 8, Luma([100]));
        let at = GrayImage::from_pixel(8, 8, Luma([150]));
        let below = GrayImage::from_pixel(8, 8, Luma([149]));
        assert_eq!(differ().difference(&reference, &at).unwrap().changed_count(), 64);
        assert_eq!(differ().difference(&reference, &below).unwrap().changed_count(), 0);
    }

    #[test]
    fn darker_current_frame_also_counts() {
        let reference = GrayImage::from_pixel(8, 8, Luma([220]));
        let current = GrayImage::from_pixel(8, 8, Luma([10]));
        assert_eq!(differ().difference(&reference, &current).unwrap().changed_count(), 64);
    }

    #[test]
    fn isolated_noise_pixel_is_suppressed_by_blur() {
        let reference = GrayImage::from_pixel(9, 9, Luma([0]));
        let mut current = reference.clone();
        current.put_pixel(4, 4, Luma([255]));
        let mask = differ().difference(&reference, &current).unwrap();
        assert_eq!(mask.changed_count(), 0);
    }

    #[test]
    fn mismatched_dimensions_fail() {
        let reference = GrayImage::new(10, 10);
        let current = GrayImage::new(10, 11);
        let err = differ().difference(&reference, &current).unwrap_err();
        assert!(matches!(err, MotionError::DimensionMismatch { .. }));
    }

    #[test]
    fn empty_input_yields_empty_mask() {
        let frame = GrayImage::new(10, 10);
        assert!(differ().difference(&GrayImage::new(0, 0), &frame).unwrap().is_empty());
        assert!(differ().difference(&frame, &GrayImage::new(0, 0)).unwrap().is_empty());
    }

    #[test]
    fn invalid_kernel_is_a_config_error() {
        assert!(matches!(FrameDiffer::new(4, 50), Err(MotionError::Config { .. })));
    }

    fn frame_pair() -> impl Strategy<Value = (GrayImage, GrayImage)> {
        (1u32..12, 1u32..12).prop_flat_map(|(w, h)| {
            let len = (w * h) as usize;
            (
                proptest::collection::vec(any::<u8>(), len),
                proptest::collection::vec(any::<u8>(), len),
            )
                .prop_map(move |(a, b)| {
                    (
                        GrayImage::from_raw(w, h, a).unwrap(),
                        GrayImage::from_raw(w, h, b).unwrap(),
                    )
                })
        })
    }

    proptest! {
        #[test]
        fn mask_matches_input_size_and_is_binary((reference, current) in frame_pair()) {
            let mask = differ().difference(&reference, &current).unwrap();
            prop_assert_eq!(mask.dimensions(), current.dimensions());
            prop_assert!(mask.image().pixels().all(|p| p[0] == CHANGED || p[0] == UNCHANGED));
        }

        #[test]
        fn differencing_is_deterministic((reference, current) in frame_pair()) {
            let a = differ().difference(&reference, &current).unwrap();
            let b = differ().difference(&reference, &current).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
