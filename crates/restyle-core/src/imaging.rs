//! Image helpers shared across the generation path.
//!
//! Everything in here is pure pixel math on [`RgbImage`] buffers: the
//! conditioning resize, the deterministic fallback transform used whenever the
//! model path is unavailable, and style-reference loading.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use log::{info, warn};

/// Resize an image to the configured conditioning dimensions.
///
/// Lanczos resampling, matching the quality expectation of the conditioning
/// path.
pub fn resize_to(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(image, width, height, FilterType::Lanczos3)
}

/// Saturation factor of the fallback transform.
const FALLBACK_SATURATION: f32 = 1.4;
/// Blur sigma of the fallback transform.
const FALLBACK_BLUR_SIGMA: f32 = 1.2;
/// Blend weight of the blurred copy in the fallback transform.
const FALLBACK_BLEND_ALPHA: f32 = 0.25;

/// Lightweight deterministic filter used when the generation pipeline is
/// unavailable or fails.
///
/// A saturation boost followed by a blend with a gaussian-blurred copy at a
/// fixed mix ratio. Pure function of the input: the same image always yields
/// the same bytes.
pub fn fallback_effect(image: &RgbImage) -> RgbImage {
    let saturated = adjust_saturation(image, FALLBACK_SATURATION);
    let blurred = imageops::blur(&saturated, FALLBACK_BLUR_SIGMA);
    blend(&saturated, &blurred, FALLBACK_BLEND_ALPHA)
}

/// Load the style reference image from disk, tolerating failure.
///
/// Style conditioning is optional; a missing or unreadable file downgrades to
/// `None` with a warning so generation proceeds without the reference.
pub fn load_style_image(path: &Path) -> Option<RgbImage> {
    match image::open(path) {
        Ok(img) => {
            info!("Loaded style image from {}", path.display());
            Some(img.to_rgb8())
        }
        Err(err) => {
            warn!("Failed to load style image from {}: {}", path.display(), err);
            None
        }
    }
}

/// Scale chroma around the per-pixel luma. `factor` 1.0 is identity; values
/// above 1.0 extrapolate away from grayscale.
fn adjust_saturation(image: &RgbImage, factor: f32) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        let channel = |c: u8| {
            let value = luma + factor * (c as f32 - luma);
            value.round().clamp(0.0, 255.0) as u8
        };
        out.put_pixel(x, y, Rgb([channel(r), channel(g), channel(b)]));
    }
    out
}

/// Per-channel linear blend: `a * (1 - alpha) + b * alpha`.
fn blend(a: &RgbImage, b: &RgbImage, alpha: f32) -> RgbImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut out = RgbImage::new(a.width(), a.height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let pa = a.get_pixel(x, y).0;
        let pb = b.get_pixel(x, y).0;
        let mut mixed = [0u8; 3];
        for i in 0..3 {
            let value = pa[i] as f32 * (1.0 - alpha) + pb[i] as f32 * alpha;
            mixed[i] = value.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(mixed);
    }
    out
}
