//! Pose detector backed by a keypoint-heatmap ONNX model.
//!
//! The model emits one heatmap per body keypoint (COCO 17-point layout).
//! Keypoints are recovered by per-heatmap argmax with a confidence floor,
//! then rendered as a colored skeleton on a black canvas — the input format
//! the pose control adapter expects.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{ArrayD, IxDyn};

use super::session::DetectorSession;
use super::Detector;
use crate::error::{DetectorError, DetectorResult};

/// Model input resolution (width, height).
const INPUT_WIDTH: u32 = 192;
const INPUT_HEIGHT: u32 = 256;

/// Minimum heatmap activation for a keypoint to be considered present.
const CONFIDENCE_FLOOR: f32 = 0.3;

/// Limb segments over the COCO 17-keypoint layout.
const SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];

/// One render color per limb segment.
const LIMB_COLORS: [[u8; 3]; 16] = [
    [255, 0, 0],
    [255, 85, 0],
    [255, 170, 0],
    [255, 255, 0],
    [170, 255, 0],
    [85, 255, 0],
    [0, 255, 0],
    [0, 255, 85],
    [0, 255, 170],
    [0, 255, 255],
    [0, 170, 255],
    [0, 85, 255],
    [0, 0, 255],
    [85, 0, 255],
    [170, 0, 255],
    [255, 0, 255],
];

/// A recovered keypoint in conditioning-image coordinates.
#[derive(Debug, Clone, Copy)]
struct Keypoint {
    x: f32,
    y: f32,
    confidence: f32,
}

/// Body pose estimation detector.
pub struct PoseDetector {
    session: DetectorSession,
}

impl PoseDetector {
    /// Load the pose model from `model_path`.
    pub fn load(model_path: &Path) -> DetectorResult<Self> {
        Ok(Self {
            session: DetectorSession::load(model_path)?,
        })
    }
}

impl Detector for PoseDetector {
    fn extract(&self, image: &RgbImage) -> DetectorResult<RgbImage> {
        let (orig_w, orig_h) = image.dimensions();
        let resized = imageops::resize(image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);

        let input = chw_tensor(&resized);
        let output = self.session.run(input)?;
        let keypoints = decode_heatmaps(&output, orig_w, orig_h)?;

        let mut canvas = RgbImage::new(orig_w, orig_h);
        render_skeleton(&mut canvas, &keypoints);
        Ok(canvas)
    }

    fn name(&self) -> &'static str {
        "Pose"
    }
}

/// Pack an image into a `[1, 3, H, W]` tensor scaled to 0..=1.
fn chw_tensor(image: &RgbImage) -> ArrayD<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut tensor = ArrayD::<f32>::zeros(IxDyn(&[1, 3, height, width]));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[IxDyn(&[0, c, y as usize, x as usize])] = pixel.0[c] as f32 / 255.0;
        }
    }
    tensor
}

/// Recover keypoints from `[1, K, H, W]` heatmaps, mapped to output
/// coordinates.
fn decode_heatmaps(
    output: &ArrayD<f32>,
    out_width: u32,
    out_height: u32,
) -> DetectorResult<Vec<Keypoint>> {
    let shape = output.shape();
    let (num_keypoints, map_h, map_w) = match shape {
        [1, k, h, w] => (*k, *h, *w),
        other => {
            return Err(DetectorError::Extraction(format!(
                "unexpected pose output shape {:?}",
                other
            )))
        }
    };

    let mut keypoints = Vec::with_capacity(num_keypoints);
    for k in 0..num_keypoints {
        let mut best = (0usize, 0usize, f32::NEG_INFINITY);
        for y in 0..map_h {
            for x in 0..map_w {
                let value = output[IxDyn(&[0, k, y, x])];
                if value > best.2 {
                    best = (x, y, value);
                }
            }
        }
        keypoints.push(Keypoint {
            x: (best.0 as f32 + 0.5) / map_w as f32 * out_width as f32,
            y: (best.1 as f32 + 0.5) / map_h as f32 * out_height as f32,
            confidence: best.2,
        });
    }
    Ok(keypoints)
}

/// Draw limb segments and joint dots for every confident keypoint pair.
fn render_skeleton(canvas: &mut RgbImage, keypoints: &[Keypoint]) {
    for (segment, color) in SKELETON.iter().zip(LIMB_COLORS.iter()) {
        let (a, b) = *segment;
        let (Some(ka), Some(kb)) = (keypoints.get(a), keypoints.get(b)) else {
            continue;
        };
        if ka.confidence < CONFIDENCE_FLOOR || kb.confidence < CONFIDENCE_FLOOR {
            continue;
        }
        draw_segment(canvas, (ka.x, ka.y), (kb.x, kb.y), Rgb(*color), 2);
    }
    for keypoint in keypoints {
        if keypoint.confidence >= CONFIDENCE_FLOOR {
            draw_disc(canvas, (keypoint.x, keypoint.y), 3, Rgb([255, 255, 255]));
        }
    }
}

/// Draw a thick line segment by stamping discs along its length.
fn draw_segment(canvas: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>, radius: i64) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = from.0 + dx * t;
        let y = from.1 + dy * t;
        draw_disc(canvas, (x, y), radius, color);
    }
}

/// Fill a disc of `radius` pixels around a point, clipped to the canvas.
fn draw_disc(canvas: &mut RgbImage, center: (f32, f32), radius: i64, color: Rgb<u8>) {
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    let cx = center.0.round() as i64;
    let cy = center.1.round() as i64;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let x = cx + dx;
            let y = cy + dy;
            if x >= 0 && y >= 0 && x < width && y < height {
                canvas.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}
