// THEORY:
// The `frame` module is the entry door of the engine. Every source hands us
// pixels in whatever layout it happens to produce (RGBA from a decoder, BGR from
// a camera driver, an already-decoded `DynamicImage` from disk). The core only
// ever reasons about a single 8-bit intensity channel at the fixed canvas
// resolution, so this module is where those buffers become a `GrayImage`.
//
// Key architectural principles:
// 1.  **One Channel**: Luminance follows Rec.601 weights in integer arithmetic,
//     `(299 R + 587 G + 114 B) / 1000`, rounded to nearest.
// 2.  **Fixed Canvas**: `to_canvas` resizes anything that does not already
//     match the session resolution, so downstream stages can treat a size
//     mismatch as a programming error.
// 3.  **Dumb Container**: Like `Chunk`, a frame knows nothing about time. It is
//     a plain image; the pipeline decides which frame is "current" and which
//     is the reference.

pub mod frame {
    use crate::error::{MotionError, MotionResult};
    use image::imageops::FilterType;
    use image::{DynamicImage, GrayImage, Luma};

    /// Byte layout of an interleaved color buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ChannelLayout {
        Rgba,
        Rgb,
        Bgra,
        Bgr,
    }

    impl ChannelLayout {
        pub fn channels(self) -> usize {
            match self {
                ChannelLayout::Rgba | ChannelLayout::Bgra => 4,
                ChannelLayout::Rgb | ChannelLayout::Bgr => 3,
            }
        }

        /// Returns the (red, green, blue) bytes of one interleaved sample.
        fn rgb(self, sample: &[u8]) -> (u8, u8, u8) {
            match self {
                ChannelLayout::Rgba | ChannelLayout::Rgb => (sample[0], sample[1], sample[2]),
                ChannelLayout::Bgra | ChannelLayout::Bgr => (sample[2], sample[1], sample[0]),
            }
        }
    }

    /// Rec.601 luminance of a single RGB sample.
    pub fn luma(red: u8, green: u8, blue: u8) -> u8 {
        let weighted = 299 * red as u32 + 587 * green as u32 + 114 * blue as u32;
        ((weighted + 500) / 1000) as u8
    }

    /// Converts an interleaved color buffer into a grayscale frame.
    pub fn luma_from_interleaved(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        buffer: &[u8],
    ) -> MotionResult<GrayImage> {
        let expected = width as usize * height as usize * layout.channels();
        if buffer.len() != expected {
            return Err(MotionError::invalid_input(format!(
                "{:?} buffer for {}x{} must be {} bytes, got {}",
                layout,
                width,
                height,
                expected,
                buffer.len()
            )));
        }

        let samples: Vec<u8> = buffer
            .chunks_exact(layout.channels())
            .map(|sample| {
                let (r, g, b) = layout.rgb(sample);
                luma(r, g, b)
            })
            .collect();

        GrayImage::from_raw(width, height, samples)
            .ok_or_else(|| MotionError::invalid_input("grayscale buffer size mismatch"))
    }

    pub fn luma_from_rgba(width: u32, height: u32, buffer: &[u8]) -> MotionResult<GrayImage> {
        luma_from_interleaved(width, height, ChannelLayout::Rgba, buffer)
    }

    pub fn luma_from_rgb(width: u32, height: u32, buffer: &[u8]) -> MotionResult<GrayImage> {
        luma_from_interleaved(width, height, ChannelLayout::Rgb, buffer)
    }

    pub fn luma_from_bgr(width: u32, height: u32, buffer: &[u8]) -> MotionResult<GrayImage> {
        luma_from_interleaved(width, height, ChannelLayout::Bgr, buffer)
    }

    /// Converts a decoded image to grayscale using the same weights as the raw
    /// buffer helpers, then fits it to the canvas.
    pub fn to_canvas(image: &DynamicImage, canvas_width: u32, canvas_height: u32) -> GrayImage {
        let gray = match image {
            DynamicImage::ImageLuma8(gray) => gray.clone(),
            other => {
                let rgb = other.to_rgb8();
                GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                    let p = rgb.get_pixel(x, y);
                    Luma([luma(p[0], p[1], p[2])])
                })
            }
        };
        fit_to_canvas(gray, canvas_width, canvas_height)
    }

    /// Resizes a grayscale frame to the canvas when its dimensions differ.
    pub fn fit_to_canvas(gray: GrayImage, canvas_width: u32, canvas_height: u32) -> GrayImage {
        if gray.dimensions() == (canvas_width, canvas_height) {
            gray
        } else {
            image::imageops::resize(&gray, canvas_width, canvas_height, FilterType::Triangle)
        }
    }

    /// A frame with no samples. Used as the "no data" marker.
    pub fn is_empty(frame: &GrayImage) -> bool {
        frame.width() == 0 || frame.height() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::frame::*;
    use image::{DynamicImage, GrayImage, Rgb, RgbImage};

    #[test]
    fn luma_uses_rec601_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn bgr_and_rgb_layouts_agree_on_the_same_color() {
        let rgb = [10u8, 200, 30, 10, 200, 30];
        let bgr = [30u8, 200, 10, 30, 200, 10];
        let a = luma_from_rgb(2, 1, &rgb).unwrap();
        let b = luma_from_bgr(2, 1, &bgr).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rgba_ignores_alpha() {
        let opaque = luma_from_rgba(1, 1, &[100, 100, 100, 255]).unwrap();
        let clear = luma_from_rgba(1, 1, &[100, 100, 100, 0]).unwrap();
        assert_eq!(opaque.get_pixel(0, 0), clear.get_pixel(0, 0));
        assert_eq!(opaque.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn wrong_buffer_length_is_rejected() {
        assert!(luma_from_rgba(2, 2, &[0u8; 15]).is_err());
    }

    #[test]
    fn to_canvas_resizes_mismatched_frames() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([255, 255, 255])));
        let gray = to_canvas(&img, 32, 24);
        assert_eq!(gray.dimensions(), (32, 24));
        assert!(gray.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn empty_frames_are_detected() {
        assert!(is_empty(&GrayImage::new(0, 0)));
        assert!(is_empty(&GrayImage::new(10, 0)));
        assert!(!is_empty(&GrayImage::new(1, 1)));
    }
}
