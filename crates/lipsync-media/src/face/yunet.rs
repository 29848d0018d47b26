//! OpenCV YuNet face detector.
//!
//! Exposed through OpenCV's `FaceDetectorYN`. Needs OpenCV 4.5+ with the DNN
//! module and the `opencv` cargo feature.

use image::RgbImage;
use lipsync_models::FaceRect;
use opencv::core::{Mat, Ptr, Scalar, Size, CV_8UC3};
use opencv::objdetect::FaceDetectorYN;
use opencv::prelude::{FaceDetectorYNTrait, MatTrait, MatTraitConst};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::{sort_traversal_order, FaceDetector};
use crate::error::{FaceError, MediaResult};

const SCORE_THRESHOLD: f32 = 0.7;
const NMS_THRESHOLD: f32 = 0.3;
const TOP_K: i32 = 50;

/// YuNet detector; OpenCV needs exclusive access per call.
pub struct YuNetDetector {
    detector: Mutex<Ptr<FaceDetectorYN>>,
}

impl YuNetDetector {
    /// Load a YuNet ONNX model.
    pub fn new(model_path: &Path) -> MediaResult<Self> {
        let metadata = std::fs::metadata(model_path).map_err(|e| {
            FaceError::DetectorUnavailable(format!(
                "cannot read YuNet model {}: {}",
                model_path.display(),
                e
            ))
        })?;
        if metadata.len() < 50_000 {
            return Err(FaceError::DetectorUnavailable(format!(
                "YuNet model file appears corrupted (size: {} bytes)",
                metadata.len()
            ))
            .into());
        }

        let detector = Self::create_with_fallback(&model_path.to_string_lossy())?;
        info!(model = %model_path.display(), "YuNet detector initialized");

        Ok(Self {
            detector: Mutex::new(detector),
        })
    }

    /// Try the default DNN backend, then plain OpenCV.
    fn create_with_fallback(model_path: &str) -> MediaResult<Ptr<FaceDetectorYN>> {
        use opencv::dnn::{DNN_BACKEND_DEFAULT, DNN_BACKEND_OPENCV, DNN_TARGET_CPU};

        let backends = [
            (DNN_BACKEND_DEFAULT, DNN_TARGET_CPU, "default"),
            (DNN_BACKEND_OPENCV, DNN_TARGET_CPU, "opencv"),
        ];

        let mut last_error = String::new();
        for (backend_id, target_id, backend_name) in backends {
            match FaceDetectorYN::create(
                model_path,
                "",
                Size::new(320, 320),
                SCORE_THRESHOLD,
                NMS_THRESHOLD,
                TOP_K,
                backend_id,
                target_id,
            ) {
                Ok(detector) => {
                    debug!("YuNet created with {} backend", backend_name);
                    return Ok(detector);
                }
                Err(e) => {
                    warn!("YuNet {} backend failed: {}", backend_name, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(FaceError::DetectorUnavailable(format!(
            "failed to create YuNet detector with any backend: {}",
            last_error
        ))
        .into())
    }

    /// Copy an RGB image into a BGR `Mat`.
    fn to_bgr_mat(image: &RgbImage) -> MediaResult<Mat> {
        let mut mat = Mat::new_rows_cols_with_default(
            image.height() as i32,
            image.width() as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )
        .map_err(|e| FaceError::DetectionFailed(e.to_string()))?;

        let bytes = mat
            .data_bytes_mut()
            .map_err(|e| FaceError::DetectionFailed(e.to_string()))?;
        for (dst, src) in bytes.chunks_exact_mut(3).zip(image.pixels()) {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
        }
        Ok(mat)
    }
}

impl FaceDetector for YuNetDetector {
    fn detect(&self, image: &RgbImage) -> MediaResult<Vec<FaceRect>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let frame = Self::to_bgr_mat(image)?;
        let mut detector = self
            .detector
            .lock()
            .map_err(|_| FaceError::DetectionFailed("detector lock poisoned".to_string()))?;

        detector
            .set_input_size(Size::new(width as i32, height as i32))
            .map_err(|e| FaceError::DetectionFailed(e.to_string()))?;

        let mut faces = Mat::default();
        detector
            .detect(&frame, &mut faces)
            .map_err(|e| FaceError::DetectionFailed(format!("YuNet detection failed: {}", e)))?;

        // Row layout: [x, y, w, h, 10 landmark coords, score]
        let mut rects = Vec::new();
        if faces.cols() >= 15 {
            for i in 0..faces.rows() {
                let read = |col: i32| faces.at_2d::<f32>(i, col).map(|v| *v as f64);
                let (Ok(x), Ok(y), Ok(w), Ok(h), Ok(score)) =
                    (read(0), read(1), read(2), read(3), read(14))
                else {
                    continue;
                };
                if score < SCORE_THRESHOLD as f64 {
                    continue;
                }
                if let Some(rect) = FaceRect::from_xywh_clamped(x, y, w, h, width, height) {
                    rects.push(rect);
                }
            }
        }

        sort_traversal_order(&mut rects);
        debug!(count = rects.len(), "YuNet detection completed");
        Ok(rects)
    }

    fn name(&self) -> &'static str {
        "yunet"
    }
}
