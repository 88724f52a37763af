//! Line-art detector.
//!
//! Dark strokes on a white background, the inverse polarity of the soft-edge
//! map. Gradient response is boosted before inversion so faint contours still
//! read as lines.

use image::{Rgb, RgbImage};

use super::gradient::{gaussian_blur, luminance, magnitude, sobel_gradients};
use super::Detector;
use crate::error::{DetectorError, DetectorResult};

const SMOOTHING_SIGMA: f32 = 1.0;
/// Gain applied to the normalized gradient before inversion.
const STROKE_GAIN: f32 = 1.6;

/// Line-art extraction detector.
pub struct LineArtDetector;

impl LineArtDetector {
    /// Create a line-art detector.
    pub fn new() -> Self {
        Self
    }
}

impl Default for LineArtDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for LineArtDetector {
    fn extract(&self, image: &RgbImage) -> DetectorResult<RgbImage> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        if width < 3 || height < 3 {
            return Err(DetectorError::InvalidInput(format!(
                "image too small for line-art extraction: {}x{}",
                width, height
            )));
        }

        let gray = luminance(image);
        let smoothed = gaussian_blur(&gray, width, height, SMOOTHING_SIGMA);
        let (gx, gy) = sobel_gradients(&smoothed, width, height);
        let mag = magnitude(&gx, &gy);

        let max = mag.iter().cloned().fold(0.0f32, f32::max);
        let mut out = RgbImage::from_pixel(width as u32, height as u32, Rgb([255, 255, 255]));
        if max > 0.0 {
            for (idx, value) in mag.iter().enumerate() {
                let stroke = (value / max * STROKE_GAIN).min(1.0);
                let intensity = (255.0 * (1.0 - stroke)).round() as u8;
                let x = (idx % width) as u32;
                let y = (idx / width) as u32;
                out.put_pixel(x, y, Rgb([intensity, intensity, intensity]));
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "LineArt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strokes_are_dark_on_white() {
        let img = RgbImage::from_fn(24, 24, |x, _| {
            if x < 12 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let art = LineArtDetector::new().extract(&img).unwrap();

        // The step becomes a dark stroke; flat regions stay near white.
        assert!(art.get_pixel(12, 12).0[0] < 60);
        assert!(art.get_pixel(1, 12).0[0] > 220);
    }

    #[test]
    fn test_flat_image_is_white() {
        let flat = RgbImage::from_pixel(16, 16, Rgb([120, 120, 120]));
        let art = LineArtDetector::new().extract(&flat).unwrap();
        assert!(art.pixels().all(|p| p.0 == [255, 255, 255]));
    }
}
