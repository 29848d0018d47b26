//! JPEG crops shown to the caller when a face must be chosen.

use image::{ImageFormat, RgbImage};
use lipsync_models::DetectedFace;
use std::path::Path;
use tracing::debug;

use super::locator::FaceRegion;
use crate::error::MediaResult;

/// Write `face_<idx>.jpg` for every region into `dir` (created if missing).
pub fn write_face_previews(
    image: &RgbImage,
    regions: &[FaceRegion],
    dir: &Path,
) -> MediaResult<Vec<DetectedFace>> {
    std::fs::create_dir_all(dir)?;

    regions
        .iter()
        .map(|region| {
            let rect = region.rect;
            let crop = image::imageops::crop_imm(
                image,
                rect.left,
                rect.top,
                rect.width(),
                rect.height(),
            )
            .to_image();

            let path = dir.join(format!("face_{}.jpg", region.index));
            crop.save_with_format(&path, ImageFormat::Jpeg)?;
            debug!(face = region.index, path = %path.display(), "Wrote face preview");

            Ok(DetectedFace {
                index: region.index,
                rect,
                preview_path: Some(path),
            })
        })
        .collect()
}
