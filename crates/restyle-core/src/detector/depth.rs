//! Depth-map detector backed by a relative-depth ONNX model.
//!
//! The model predicts relative inverse depth on a fixed-size input; the map
//! is min-max normalized to 8-bit grayscale and resized back to the
//! conditioning dimensions.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{ArrayD, IxDyn};

use super::session::DetectorSession;
use super::Detector;
use crate::error::{DetectorError, DetectorResult};

/// Fixed square input resolution of the depth model.
const INPUT_SIZE: u32 = 256;

/// ImageNet channel statistics the model was trained with.
const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Relative depth estimation detector.
pub struct DepthDetector {
    session: DetectorSession,
}

impl DepthDetector {
    /// Load the depth model from `model_path`.
    pub fn load(model_path: &Path) -> DetectorResult<Self> {
        Ok(Self {
            session: DetectorSession::load(model_path)?,
        })
    }
}

impl Detector for DepthDetector {
    fn extract(&self, image: &RgbImage) -> DetectorResult<RgbImage> {
        let (orig_w, orig_h) = image.dimensions();
        let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

        let input = normalized_chw_tensor(&resized);
        let output = self.session.run(input)?;

        let (map_h, map_w, plane) = depth_plane(&output)?;
        let gray = normalize_to_gray(plane);

        let mut map = RgbImage::new(map_w as u32, map_h as u32);
        for (idx, value) in gray.iter().enumerate() {
            let x = (idx % map_w) as u32;
            let y = (idx / map_w) as u32;
            map.put_pixel(x, y, Rgb([*value, *value, *value]));
        }
        Ok(imageops::resize(&map, orig_w, orig_h, FilterType::Triangle))
    }

    fn name(&self) -> &'static str {
        "Depth"
    }
}

/// Pack an image into a normalized `[1, 3, H, W]` tensor.
fn normalized_chw_tensor(image: &RgbImage) -> ArrayD<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut tensor = ArrayD::<f32>::zeros(IxDyn(&[1, 3, height, width]));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel.0[c] as f32 / 255.0;
            tensor[IxDyn(&[0, c, y as usize, x as usize])] =
                (value - CHANNEL_MEAN[c]) / CHANNEL_STD[c];
        }
    }
    tensor
}

/// Interpret the model output as a single `[H, W]` depth plane.
///
/// Accepts `[1, H, W]` and `[1, 1, H, W]` layouts.
fn depth_plane(output: &ArrayD<f32>) -> DetectorResult<(usize, usize, &[f32])> {
    let shape = output.shape();
    let (h, w) = match shape {
        [1, h, w] => (*h, *w),
        [1, 1, h, w] => (*h, *w),
        other => {
            return Err(DetectorError::Extraction(format!(
                "unexpected depth output shape {:?}",
                other
            )))
        }
    };
    let plane = output.as_slice().ok_or_else(|| {
        DetectorError::extraction("depth output tensor is not contiguous")
    })?;
    Ok((h, w, plane))
}

/// Min-max normalize a depth plane to 8-bit intensities.
fn normalize_to_gray(plane: &[f32]) -> Vec<u8> {
    let min = plane.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = plane.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0u8; plane.len()];
    }
    plane
        .iter()
        .map(|value| (((value - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_to_gray_full_range() {
        let gray = normalize_to_gray(&[0.0, 5.0, 10.0]);
        assert_eq!(gray, vec![0, 128, 255]);
    }

    #[test]
    fn test_normalize_flat_plane_is_black() {
        let gray = normalize_to_gray(&[3.0, 3.0, 3.0]);
        assert_eq!(gray, vec![0, 0, 0]);
    }

    #[test]
    fn test_depth_plane_accepts_both_layouts() {
        let three_d = ArrayD::<f32>::zeros(IxDyn(&[1, 4, 6]));
        assert_eq!(depth_plane(&three_d).unwrap().0, 4);

        let four_d = ArrayD::<f32>::zeros(IxDyn(&[1, 1, 8, 2]));
        let (h, w, _) = depth_plane(&four_d).unwrap();
        assert_eq!((h, w), (8, 2));

        let bad = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4]));
        assert!(depth_plane(&bad).is_err());
    }

    #[test]
    fn test_tensor_normalization() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 128]));
        let tensor = normalized_chw_tensor(&img);
        assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
        // Red channel: (1.0 - 0.485) / 0.229
        let red = tensor[IxDyn(&[0, 0, 0, 0])];
        assert!((red - (1.0 - 0.485) / 0.229).abs() < 1e-5);
    }

    #[test]
    fn test_load_missing_model_fails() {
        assert!(DepthDetector::load(Path::new("/nonexistent/depth.onnx")).is_err());
    }
}
