//! Adapter from raw detector output to validated, indexed face regions.

use image::RgbImage;
use lipsync_models::FaceRect;
use std::sync::Arc;
use tracing::debug;

use super::FaceDetector;
use crate::error::{FaceError, MediaResult};

/// A face rectangle plus its positional index within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub index: usize,
    pub rect: FaceRect,
}

/// Wraps a detector and guarantees in-bounds, non-empty rectangles.
#[derive(Clone)]
pub struct FaceLocator {
    detector: Arc<dyn FaceDetector>,
}

impl FaceLocator {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self { detector }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Detect faces in `image`, in detector order.
    ///
    /// An empty list is a normal result here; deciding whether that is fatal
    /// is the caller's business.
    pub fn locate(&self, image: &RgbImage) -> MediaResult<Vec<FaceRegion>> {
        let (width, height) = image.dimensions();
        let raw = self.detector.detect(image)?;
        let raw_count = raw.len();

        let regions: Vec<FaceRegion> = raw
            .into_iter()
            .filter_map(|rect| clamp_to_frame(rect, width, height))
            .enumerate()
            .map(|(index, rect)| FaceRegion { index, rect })
            .collect();

        if regions.len() != raw_count {
            debug!(
                detector = self.detector.name(),
                dropped = raw_count - regions.len(),
                "Dropped out-of-frame face rectangles"
            );
        }

        Ok(regions)
    }
}

/// Pick the face at `index`.
pub fn select(regions: &[FaceRegion], index: usize) -> Result<FaceRegion, FaceError> {
    regions
        .get(index)
        .copied()
        .ok_or(FaceError::FaceIndexOutOfRange {
            index,
            count: regions.len(),
        })
}

/// Intersect with the frame; `None` if nothing of the rectangle remains.
fn clamp_to_frame(rect: FaceRect, width: u32, height: u32) -> Option<FaceRect> {
    if rect.ensure_within(width, height).is_ok() {
        return Some(rect);
    }
    FaceRect::new(
        rect.top,
        rect.right.min(width),
        rect.bottom.min(height),
        rect.left,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<FaceRect>);

    impl FaceDetector for Fixed {
        fn detect(&self, _image: &RgbImage) -> MediaResult<Vec<FaceRect>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn locator(rects: Vec<FaceRect>) -> FaceLocator {
        FaceLocator::new(Arc::new(Fixed(rects)))
    }

    #[test]
    fn test_empty_detection_is_not_an_error() {
        let image = RgbImage::new(64, 64);
        let regions = locator(vec![]).locate(&image).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_indices_follow_detector_order() {
        let image = RgbImage::new(200, 100);
        let a = FaceRect::new(10, 60, 60, 10).unwrap();
        let b = FaceRect::new(10, 160, 60, 110).unwrap();
        let regions = locator(vec![a, b]).locate(&image).unwrap();

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0], FaceRegion { index: 0, rect: a });
        assert_eq!(regions[1], FaceRegion { index: 1, rect: b });
    }

    #[test]
    fn test_rectangles_are_clamped_or_dropped() {
        let image = RgbImage::new(100, 100);
        let partial = FaceRect::new(80, 130, 120, 70).unwrap();
        let outside = FaceRect::new(0, 300, 50, 200).unwrap();
        let regions = locator(vec![partial, outside]).locate(&image).unwrap();

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect, FaceRect::new(80, 100, 100, 70).unwrap());
    }

    #[test]
    fn test_select_out_of_range() {
        let rect = FaceRect::new(0, 10, 10, 0).unwrap();
        let regions: Vec<FaceRegion> = (0..3).map(|index| FaceRegion { index, rect }).collect();

        assert_eq!(select(&regions, 2).unwrap().index, 2);
        let err = select(&regions, 5).unwrap_err();
        assert!(matches!(err, FaceError::FaceIndexOutOfRange { index: 5, count: 3 }));
    }
}
