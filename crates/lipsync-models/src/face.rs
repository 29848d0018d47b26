//! Face rectangles in frame pixel coordinates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when building a face rectangle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaceRectError {
    #[error("empty rectangle: top={top} right={right} bottom={bottom} left={left}")]
    Empty {
        top: u32,
        right: u32,
        bottom: u32,
        left: u32,
    },

    #[error("rectangle {rect:?} exceeds frame {width}x{height}")]
    OutOfBounds {
        rect: FaceRect,
        width: u32,
        height: u32,
    },
}

/// Axis-aligned face rectangle.
///
/// Uses the `(top, right, bottom, left)` convention. `right` and `bottom`
/// are exclusive, so the rectangle covers columns `left..right` and rows
/// `top..bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FaceRect {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRect {
    /// Create a rectangle, rejecting zero-area boxes.
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Result<Self, FaceRectError> {
        if right <= left || bottom <= top {
            return Err(FaceRectError::Empty {
                top,
                right,
                bottom,
                left,
            });
        }
        Ok(Self {
            top,
            right,
            bottom,
            left,
        })
    }

    /// Build a rectangle from floating-point `x, y, width, height`,
    /// clamping it to the frame. Returns `None` when nothing is left.
    pub fn from_xywh_clamped(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return None;
        }
        let left = x.max(0.0).round() as u32;
        let top = y.max(0.0).round() as u32;
        let right = ((x + width).round().max(0.0) as u32).min(frame_width);
        let bottom = ((y + height).round().max(0.0) as u32).min(frame_height);
        Self::new(top, right, bottom, left).ok()
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Area in pixels.
    #[inline]
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Whether the pixel `(x, y)` lies inside the rectangle.
    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Check that the rectangle lies inside a `width x height` frame.
    pub fn ensure_within(&self, width: u32, height: u32) -> Result<(), FaceRectError> {
        if self.right > width || self.bottom > height {
            return Err(FaceRectError::OutOfBounds {
                rect: *self,
                width,
                height,
            });
        }
        Ok(())
    }

    /// Intersection over Union with another rectangle.
    pub fn iou(&self, other: &FaceRect) -> f64 {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);

        if right <= left || bottom <= top {
            return 0.0;
        }

        let intersection = (right - left) as f64 * (bottom - top) as f64;
        let union = self.area() as f64 + other.area() as f64 - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_rect() {
        assert!(FaceRect::new(10, 10, 20, 10).is_err());
        assert!(FaceRect::new(20, 30, 20, 10).is_err());
    }

    #[test]
    fn test_dimensions() {
        let rect = FaceRect::new(10, 50, 40, 20).unwrap();
        assert_eq!(rect.width(), 30);
        assert_eq!(rect.height(), 30);
        assert_eq!(rect.area(), 900);
        assert!(rect.contains(20, 10));
        assert!(!rect.contains(50, 10));
        assert!(!rect.contains(20, 40));
    }

    #[test]
    fn test_from_xywh_clamps_to_frame() {
        let rect = FaceRect::from_xywh_clamped(-5.0, 10.0, 50.0, 200.0, 100, 100).unwrap();
        assert_eq!(rect.left, 0);
        assert_eq!(rect.top, 10);
        assert_eq!(rect.right, 45);
        assert_eq!(rect.bottom, 100);

        assert!(FaceRect::from_xywh_clamped(120.0, 0.0, 10.0, 10.0, 100, 100).is_none());
        assert!(FaceRect::from_xywh_clamped(f64::NAN, 0.0, 10.0, 10.0, 100, 100).is_none());
    }

    #[test]
    fn test_iou() {
        let a = FaceRect::new(0, 10, 10, 0).unwrap();
        let b = FaceRect::new(0, 15, 10, 5).unwrap();
        let c = FaceRect::new(50, 60, 60, 50).unwrap();

        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-9);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_ensure_within() {
        let rect = FaceRect::new(0, 100, 50, 0).unwrap();
        assert!(rect.ensure_within(100, 50).is_ok());
        assert!(rect.ensure_within(99, 50).is_err());
    }
}
