//! Shared grayscale/gradient math for the classical edge detectors.
//!
//! All functions operate on row-major `f32` planes in the 0..=255 range and
//! clamp at the image border.

use image::RgbImage;

/// Per-pixel luma plane (ITU-R 601 weights).
pub(crate) fn luminance(image: &RgbImage) -> Vec<f32> {
    image
        .pixels()
        .map(|p| 0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32)
        .collect()
}

/// Separable gaussian blur on a luma plane.
pub(crate) fn gaussian_blur(src: &[f32], width: usize, height: usize, sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil().max(1.0) as i64;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    let denom = 2.0 * sigma * sigma;
    for offset in -radius..=radius {
        kernel.push((-(offset * offset) as f32 / denom).exp());
    }
    let sum: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }

    let clamp = |value: i64, max: usize| value.clamp(0, max as i64 - 1) as usize;

    // Horizontal pass.
    let mut horizontal = vec![0.0f32; src.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (i, weight) in kernel.iter().enumerate() {
                let sx = clamp(x as i64 + i as i64 - radius, width);
                acc += src[y * width + sx] * weight;
            }
            horizontal[y * width + x] = acc;
        }
    }

    // Vertical pass.
    let mut out = vec![0.0f32; src.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (i, weight) in kernel.iter().enumerate() {
                let sy = clamp(y as i64 + i as i64 - radius, height);
                acc += horizontal[sy * width + x] * weight;
            }
            out[y * width + x] = acc;
        }
    }
    out
}

/// Sobel gradients of a luma plane: `(gx, gy)`.
pub(crate) fn sobel_gradients(src: &[f32], width: usize, height: usize) -> (Vec<f32>, Vec<f32>) {
    let mut gx = vec![0.0f32; src.len()];
    let mut gy = vec![0.0f32; src.len()];
    let at = |x: i64, y: i64| {
        let cx = x.clamp(0, width as i64 - 1) as usize;
        let cy = y.clamp(0, height as i64 - 1) as usize;
        src[cy * width + cx]
    };

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let idx = y as usize * width + x as usize;
            gx[idx] = at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2.0 * at(x - 1, y)
                - at(x - 1, y + 1);
            gy[idx] = at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2.0 * at(x, y - 1)
                - at(x + 1, y - 1);
        }
    }
    (gx, gy)
}

/// Gradient magnitude plane from Sobel gradients.
pub(crate) fn magnitude(gx: &[f32], gy: &[f32]) -> Vec<f32> {
    gx.iter()
        .zip(gy.iter())
        .map(|(x, y)| (x * x + y * y).sqrt())
        .collect()
}
