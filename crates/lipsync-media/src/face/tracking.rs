//! Choosing the face to re-render on each frame.
//!
//! By default the face index is positional: frame `i` uses the `index`-th
//! rectangle the detector returns for frame `i`, with no notion of identity.
//! If faces swap order between frames the selection swaps too. Tracking mode
//! instead follows the rectangle that overlaps the previous selection most.

use lipsync_models::FaceRect;

use super::locator::FaceRegion;

/// Minimum overlap for a rectangle to count as the same face.
const MIN_TRACK_IOU: f64 = 0.05;

/// Per-job face selection state. Must see frames in order.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceSelector {
    /// The `index`-th face of every frame
    Positional { index: usize },
    /// The face overlapping `previous` the most
    Tracked { previous: FaceRect },
}

impl FaceSelector {
    pub fn positional(index: usize) -> Self {
        FaceSelector::Positional { index }
    }

    /// Track starting from the face chosen on the first frame.
    pub fn tracked(initial: FaceRect) -> Self {
        FaceSelector::Tracked { previous: initial }
    }

    /// Rectangle to use for this frame, or `None` to pass the frame through.
    pub fn select(&mut self, regions: &[FaceRegion]) -> Option<FaceRect> {
        match self {
            FaceSelector::Positional { index } => regions.get(*index).map(|r| r.rect),
            FaceSelector::Tracked { previous } => {
                let best = regions
                    .iter()
                    .map(|r| (r.rect, r.rect.iou(previous)))
                    .filter(|(_, iou)| *iou >= MIN_TRACK_IOU)
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(rect, _)| rect)?;
                *previous = best;
                Some(best)
            }
        }
    }
}
