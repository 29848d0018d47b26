//! Face location: detector backends, per-frame selection and previews.
//!
//! The detector itself is opaque: given an RGB image it returns zero or more
//! rectangles in a stable order. Everything on top of that (clamping,
//! index selection, optional tracking) lives in [`locator`] and
//! [`tracking`].

pub mod locator;
pub mod preview;
pub mod tracking;
pub mod ultraface;
#[cfg(feature = "opencv")]
pub mod yunet;

pub use locator::{FaceLocator, FaceRegion};
pub use preview::write_face_previews;
pub use tracking::FaceSelector;
pub use ultraface::UltraFaceDetector;
#[cfg(feature = "opencv")]
pub use yunet::YuNetDetector;

use image::RgbImage;
use lipsync_models::FaceRect;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{FaceError, MediaResult};

/// Face detection backend.
///
/// Rectangles come back in the detector's traversal order, which the
/// rest of the pipeline treats as the positional face index.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in an RGB image.
    fn detect(&self, image: &RgbImage) -> MediaResult<Vec<FaceRect>>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Available detector backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorKind {
    #[default]
    UltraFace,
    YuNet,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::UltraFace => "ultraface",
            DetectorKind::YuNet => "yunet",
        }
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ultraface" => Ok(DetectorKind::UltraFace),
            "yunet" => Ok(DetectorKind::YuNet),
            other => Err(format!("unknown face detector '{}'", other)),
        }
    }
}

/// Order rectangles left-to-right, then top-to-bottom.
pub(crate) fn sort_traversal_order(rects: &mut [FaceRect]) {
    rects.sort_by_key(|r| (r.left, r.top));
}

/// Build the configured detector backend.
pub fn create_detector(kind: DetectorKind, model_path: &Path) -> MediaResult<Arc<dyn FaceDetector>> {
    match kind {
        DetectorKind::UltraFace => Ok(Arc::new(UltraFaceDetector::new(model_path)?)),
        #[cfg(feature = "opencv")]
        DetectorKind::YuNet => Ok(Arc::new(YuNetDetector::new(model_path)?)),
        #[cfg(not(feature = "opencv"))]
        DetectorKind::YuNet => Err(FaceError::DetectorUnavailable(
            "YuNet requires building with the `opencv` feature".to_string(),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_kind_parsing() {
        assert_eq!("ultraface".parse::<DetectorKind>().unwrap(), DetectorKind::UltraFace);
        assert_eq!("YuNet".parse::<DetectorKind>().unwrap(), DetectorKind::YuNet);
        assert!("haar".parse::<DetectorKind>().is_err());
    }

    #[test]
    fn test_traversal_order() {
        let mut rects = vec![
            FaceRect::new(0, 300, 100, 200).unwrap(),
            FaceRect::new(50, 100, 150, 0).unwrap(),
            FaceRect::new(0, 100, 40, 0).unwrap(),
        ];
        sort_traversal_order(&mut rects);
        assert_eq!(rects[0].top, 0);
        assert_eq!(rects[0].left, 0);
        assert_eq!(rects[1].top, 50);
        assert_eq!(rects[2].left, 200);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_yunet_needs_feature() {
        let err = create_detector(DetectorKind::YuNet, Path::new("yunet.onnx")).err().unwrap();
        assert_eq!(err.classification(), "face");
    }
}
