//! Canny edge detector.
//!
//! Classical pipeline: gaussian smoothing, Sobel gradients, non-maximum
//! suppression, hysteresis thresholding. Edges are rendered white on black,
//! matching what the edge control adapter was trained on.

use image::{Rgb, RgbImage};

use super::gradient::{gaussian_blur, luminance, magnitude, sobel_gradients};
use super::Detector;
use crate::error::{DetectorError, DetectorResult};

/// Smoothing applied before gradient estimation.
const SMOOTHING_SIGMA: f32 = 1.4;

/// Canny edge detector with configurable hysteresis thresholds.
pub struct CannyDetector {
    low_threshold: f32,
    high_threshold: f32,
}

impl CannyDetector {
    /// Create a detector with the given low/high hysteresis thresholds.
    pub fn new(low_threshold: f32, high_threshold: f32) -> Self {
        Self {
            low_threshold,
            high_threshold,
        }
    }
}

impl Detector for CannyDetector {
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

        let thin = non_maximum_suppression(&mag, &gx, &gy, width, height);
        let edges = hysteresis(&thin, width, height, self.low_threshold, self.high_threshold);

        let mut out = RgbImage::new(width as u32, height as u32);
        for (idx, on) in edges.iter().enumerate() {
            if *on {
                let x = (idx % width) as u32;
                let y = (idx / width) as u32;
                out.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "Canny"
    }
}

/// Keep only pixels that are local maxima along their gradient direction,
/// quantized to the four principal orientations.
fn non_maximum_suppression(
    mag: &[f32],
    gx: &[f32],
    gy: &[f32],
    width: usize,
    height: usize,
) -> Vec<f32> {
    let mut out = vec![0.0f32; mag.len()];
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let value = mag[idx];
            if value == 0.0 {
                continue;
            }
            let angle = gy[idx].atan2(gx[idx]).to_degrees();
            let angle = if angle < 0.0 { angle + 180.0 } else { angle };

            let (a, b) = if !(22.5..157.5).contains(&angle) {
                // Horizontal gradient: compare left/right.
                (mag[idx - 1], mag[idx + 1])
            } else if angle < 67.5 {
                // Diagonal "/".
                (mag[idx - width + 1], mag[idx + width - 1])
            } else if angle < 112.5 {
                // Vertical gradient: compare up/down.
                (mag[idx - width], mag[idx + width])
            } else {
                // Diagonal "\".
                (mag[idx - width - 1], mag[idx + width + 1])
            };

            if value >= a && value >= b {
                out[idx] = value;
            }
        }
    }
    out
}

/// Hysteresis: strong pixels seed edges, weak pixels join only when
/// 8-connected to a strong one.
fn hysteresis(thin: &[f32], width: usize, height: usize, low: f32, high: f32) -> Vec<bool> {
    let mut edges = vec![false; thin.len()];
    let mut stack: Vec<usize> = thin
        .iter()
        .enumerate()
        .filter(|(_, &value)| value >= high)
        .map(|(idx, _)| idx)
        .collect();
    for &idx in &stack {
        edges[idx] = true;
    }

    while let Some(idx) = stack.pop() {
        let x = (idx % width) as i64;
        let y = (idx / width) as i64;
        for dy in -1..=1i64 {
            for dx in -1..=1i64 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let nidx = ny as usize * width + nx as usize;
                if !edges[nidx] && thin[nidx] >= low {
                    edges[nidx] = true;
                    stack.push(nidx);
                }
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Image with a bright square on a dark background.
    fn square_image() -> RgbImage {
        RgbImage::from_fn(32, 32, |x, y| {
            if (8..24).contains(&x) && (8..24).contains(&y) {
                Rgb([220, 220, 220])
            } else {
                Rgb([10, 10, 10])
            }
        })
    }

    #[test]
    fn test_detects_square_outline() {
        let detector = CannyDetector::new(50.0, 120.0);
        let edges = detector.extract(&square_image()).unwrap();

        let lit: usize = edges.pixels().filter(|p| p.0[0] > 0).count();
        // The outline of a 16x16 square is in the dozens of pixels; a filled
        // or empty result would be wildly off.
        assert!(lit > 30, "expected an outline, got {} edge pixels", lit);
        assert!(lit < 300, "expected a thin outline, got {} edge pixels", lit);
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let detector = CannyDetector::new(100.0, 200.0);
        let flat = RgbImage::from_pixel(16, 16, Rgb([90, 90, 90]));
        let edges = detector.extract(&flat).unwrap();
        assert!(edges.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_rejects_tiny_image() {
        let detector = CannyDetector::new(100.0, 200.0);
        let tiny = RgbImage::new(2, 2);
        assert!(matches!(
            detector.extract(&tiny),
            Err(DetectorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_output_is_binary_white_on_black() {
        let detector = CannyDetector::new(50.0, 120.0);
        let edges = detector.extract(&square_image()).unwrap();
        assert!(edges
            .pixels()
            .all(|p| p.0 == [0, 0, 0] || p.0 == [255, 255, 255]));
    }
}
