//! Face crop extraction at the model's input resolution.

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use lipsync_models::FaceRect;

/// Side length of the square face input the generator expects.
pub const REGION_SIZE: u32 = 96;

/// Drop alpha and expand grayscale to plain 8-bit RGB.
pub fn to_rgb(image: &DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb.clone(),
        other => other.to_rgb8(),
    }
}

/// Crop `rect` out of `frame` and resize it to `size`×`size` (bilinear).
///
/// `rect` must already lie inside the frame; the locator guarantees that.
pub fn extract(frame: &RgbImage, rect: FaceRect, size: u32) -> RgbImage {
    let crop = image::imageops::crop_imm(frame, rect.left, rect.top, rect.width(), rect.height())
        .to_image();
    image::imageops::resize(&crop, size, size, FilterType::Triangle)
}

/// Same as [`extract`] for any color layout.
pub fn extract_dynamic(image: &DynamicImage, rect: FaceRect, size: u32) -> RgbImage {
    extract(&to_rgb(image), rect, size)
}

/// Resize a synthesized face back to the crop's original size.
pub fn restore_size(synced: &RgbImage, rect: FaceRect) -> RgbImage {
    if synced.dimensions() == (rect.width(), rect.height()) {
        return synced.clone();
    }
    image::imageops::resize(synced, rect.width(), rect.height(), FilterType::Triangle)
}
