//! Soft-edged compositing of synthesized faces back into frames.
//!
//! The mask is an ellipse centered in the face rectangle with semi-axes of
//! one third of its width and half its height, feathered with a Gaussian
//! blur. Only pixels inside the rectangle are ever written.

use image::{ImageBuffer, Luma, RgbImage};
use lipsync_models::FaceRect;

use crate::region::restore_size;

/// Per-pixel blend weights in [0, 1]; 1 takes the synthesized pixel.
pub type Mask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Feathering radius as a fraction of the shorter rectangle side.
const FEATHER_FRACTION: f32 = 0.05;

/// Build the feathered elliptical mask for a `width`×`height` rectangle.
pub fn build_mask(width: u32, height: u32) -> Mask {
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let a = (width as f32 / 3.0).max(f32::EPSILON);
    let b = (height as f32 / 2.0).max(f32::EPSILON);

    let hard = Mask::from_fn(width, height, |x, y| {
        let dx = (x as f32 + 0.5 - cx) / a;
        let dy = (y as f32 + 0.5 - cy) / b;
        Luma([if dx * dx + dy * dy <= 1.0 { 1.0 } else { 0.0 }])
    });

    let sigma = (FEATHER_FRACTION * width.min(height) as f32).max(1.0);
    let mut soft = image::imageops::blur(&hard, sigma);
    for p in soft.pixels_mut() {
        p.0[0] = p.0[0].clamp(0.0, 1.0);
    }
    soft
}

/// Blend with the default feathered mask.
pub fn blend(original: &RgbImage, synced: &RgbImage, rect: FaceRect) -> RgbImage {
    let mask = build_mask(rect.width(), rect.height());
    blend_with_mask(original, synced, rect, &mask)
}

/// `synced * mask + original * (1 - mask)` inside `rect`; everything else is copied.
///
/// `synced` is resized to the rectangle if needed. `mask` must be rectangle
/// sized; pixels it does not cover keep the original value.
pub fn blend_with_mask(original: &RgbImage, synced: &RgbImage, rect: FaceRect, mask: &Mask) -> RgbImage {
    let synced = restore_size(synced, rect);
    let mut out = original.clone();

    let right = rect.right.min(original.width());
    let bottom = rect.bottom.min(original.height());

    for y in rect.top..bottom {
        for x in rect.left..right {
            let (lx, ly) = (x - rect.left, y - rect.top);
            let Some(m) = mask.get_pixel_checked(lx, ly).map(|p| p.0[0]) else {
                continue;
            };
            if m <= 0.0 {
                continue;
            }
            let s = synced.get_pixel(lx, ly);
            let o = original.get_pixel(x, y);
            let px = out.get_pixel_mut(x, y);
            for c in 0..3 {
                let v = s[c] as f32 * m + o[c] as f32 * (1.0 - m);
                px[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}
