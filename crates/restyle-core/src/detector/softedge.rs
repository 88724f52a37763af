//! Soft-edge detector.
//!
//! Produces a smooth grayscale edge map (HED-style): gaussian smoothing
//! followed by normalized Sobel gradient magnitude. Unlike the Canny
//! detector there is no thresholding, so edge strength is preserved as
//! intensity.

use image::{Rgb, RgbImage};

use super::gradient::{gaussian_blur, luminance, magnitude, sobel_gradients};
use super::Detector;
use crate::error::{DetectorError, DetectorResult};

/// Heavier smoothing than Canny; soft maps favor broad strokes over detail.
const SMOOTHING_SIGMA: f32 = 2.0;

/// Soft grayscale edge-map detector.
pub struct SoftEdgeDetector;

impl SoftEdgeDetector {
    /// Create a soft-edge detector.
    pub fn new() -> Self {
        Self
    }
}

impl Default for SoftEdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for SoftEdgeDetector {
    fn extract(&self, image: &RgbImage) -> DetectorResult<RgbImage> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        if width < 3 || height < 3 {
            return Err(DetectorError::InvalidInput(format!(
                "image too small for edge detection: {}x{}",
                width, height
            )));
        }

        let gray = luminance(image);
        let smoothed = gaussian_blur(&gray, width, height, SMOOTHING_SIGMA);
        let (gx, gy) = sobel_gradients(&smoothed, width, height);
        let mag = magnitude(&gx, &gy);

        let max = mag.iter().cloned().fold(0.0f32, f32::max);
        let mut out = RgbImage::new(width as u32, height as u32);
        if max > 0.0 {
            for (idx, value) in mag.iter().enumerate() {
                let intensity = (value / max * 255.0).round().clamp(0.0, 255.0) as u8;
                let x = (idx % width) as u32;
                let y = (idx / width) as u32;
                out.put_pixel(x, y, Rgb([intensity, intensity, intensity]));
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "SoftEdge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_strength_becomes_intensity() {
        let img = RgbImage::from_fn(24, 24, |x, _| {
            if x < 12 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let map = SoftEdgeDetector::new().extract(&img).unwrap();

        // Peak intensity sits on the step, far columns stay dark.
        assert!(map.get_pixel(12, 12).0[0] > 200);
        assert!(map.get_pixel(1, 12).0[0] < 30);
        assert!(map.get_pixel(22, 12).0[0] < 30);
    }

    #[test]
    fn test_flat_image_is_black() {
        let flat = RgbImage::from_pixel(16, 16, Rgb([77, 77, 77]));
        let map = SoftEdgeDetector::new().extract(&flat).unwrap();
        assert!(map.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_output_is_grayscale() {
        let img = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 0]));
        let map = SoftEdgeDetector::new().extract(&img).unwrap();
        assert!(map.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }
}
