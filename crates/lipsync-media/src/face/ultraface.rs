//! UltraFace (version-RFB-320) face detector on ONNX Runtime.
//!
//! Input is a 1×3×240×320 tensor normalized as `(x - 127) / 128`. The model
//! emits `scores` [1, N, 2] (background, face) and `boxes` [1, N, 4] as
//! normalized corner coordinates.

use image::imageops::FilterType;
use image::RgbImage;
use lipsync_models::FaceRect;
use ort::session::Session;
use ort::value::{Tensor, Value};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::{sort_traversal_order, FaceDetector};
use crate::error::{FaceError, MediaResult};
use crate::onnx::{create_session, io_names};

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;

/// Detection thresholds.
#[derive(Debug, Clone, Copy)]
pub struct UltraFaceConfig {
    /// Minimum face score
    pub confidence_threshold: f32,
    /// IoU above which the weaker of two boxes is dropped
    pub nms_threshold: f32,
}

impl Default for UltraFaceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            nms_threshold: 0.3,
        }
    }
}

/// Candidate box in normalized corner form.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = w * h;
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// UltraFace detector. The session is shared behind a mutex.
pub struct UltraFaceDetector {
    session: Mutex<Session>,
    input_name: String,
    scores_name: String,
    boxes_name: String,
    config: UltraFaceConfig,
}

impl UltraFaceDetector {
    /// Load the detector model.
    pub fn new(model_path: &Path) -> MediaResult<Self> {
        Self::with_config(model_path, UltraFaceConfig::default())
    }

    pub fn with_config(model_path: &Path, config: UltraFaceConfig) -> MediaResult<Self> {
        if !model_path.exists() {
            return Err(FaceError::DetectorUnavailable(format!(
                "face detector model not found at {}",
                model_path.display()
            ))
            .into());
        }

        let session = create_session(model_path, "face detection")
            .map_err(FaceError::DetectorUnavailable)?;
        let (inputs, outputs) = io_names(&session);

        let input_name = inputs
            .first()
            .cloned()
            .ok_or_else(|| FaceError::DetectorUnavailable("model has no inputs".to_string()))?;
        let scores_name = find_output(&outputs, "scores", 0)?;
        let boxes_name = find_output(&outputs, "boxes", 1)?;

        info!(
            model_path = %model_path.display(),
            confidence = config.confidence_threshold,
            "UltraFace detector initialized"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            scores_name,
            boxes_name,
            config,
        })
    }

    /// Resize to 320×240 and lay out as normalized NCHW.
    fn preprocess(&self, image: &RgbImage) -> MediaResult<Value> {
        let resized =
            image::imageops::resize(image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);
        let (w, h) = (INPUT_WIDTH as usize, INPUT_HEIGHT as usize);

        let mut chw = vec![0.0f32; 3 * h * w];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for c in 0..3 {
                chw[c * h * w + offset] = (pixel[c] as f32 - 127.0) / 128.0;
            }
        }

        Tensor::from_array((vec![1usize, 3, h, w], chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| FaceError::DetectionFailed(format!("failed to create tensor: {}", e)).into())
    }

    fn run_inference(&self, input: Value) -> MediaResult<(Vec<f32>, Vec<f32>)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| FaceError::DetectionFailed("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| FaceError::DetectionFailed(format!("inference failed: {}", e)))?;

        let extract = |name: &str| -> MediaResult<Vec<f32>> {
            let value = outputs
                .get(name)
                .ok_or_else(|| FaceError::DetectionFailed(format!("missing output {}", name)))?;
            let tensor = value
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::DetectionFailed(format!("bad output {}: {}", name, e)))?;
            Ok(tensor.1.to_vec())
        };

        Ok((extract(&self.scores_name)?, extract(&self.boxes_name)?))
    }

    fn postprocess(&self, scores: &[f32], boxes: &[f32], width: u32, height: u32) -> Vec<FaceRect> {
        let candidates = decode_candidates(scores, boxes, self.config.confidence_threshold);
        let kept = non_maximum_suppression(candidates, self.config.nms_threshold);

        let (fw, fh) = (width as f64, height as f64);
        let mut rects: Vec<FaceRect> = kept
            .iter()
            .filter_map(|c| {
                FaceRect::from_xywh_clamped(
                    c.x1 as f64 * fw,
                    c.y1 as f64 * fh,
                    (c.x2 - c.x1) as f64 * fw,
                    (c.y2 - c.y1) as f64 * fh,
                    width,
                    height,
                )
            })
            .collect();
        sort_traversal_order(&mut rects);
        rects
    }
}

impl FaceDetector for UltraFaceDetector {
    fn detect(&self, image: &RgbImage) -> MediaResult<Vec<FaceRect>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let input = self.preprocess(image)?;
        let (scores, boxes) = self.run_inference(input)?;
        let faces = self.postprocess(&scores, &boxes, image.width(), image.height());
        debug!(count = faces.len(), "UltraFace detection completed");
        Ok(faces)
    }

    fn name(&self) -> &'static str {
        "ultraface"
    }
}

fn find_output(outputs: &[String], name: &str, fallback: usize) -> Result<String, FaceError> {
    outputs
        .iter()
        .find(|o| o.as_str() == name)
        .or_else(|| outputs.get(fallback))
        .cloned()
        .ok_or_else(|| FaceError::DetectorUnavailable(format!("model has no '{}' output", name)))
}

/// Pair up `[N, 2]` scores with `[N, 4]` boxes and keep confident faces.
fn decode_candidates(scores: &[f32], boxes: &[f32], threshold: f32) -> Vec<Candidate> {
    scores
        .chunks_exact(2)
        .zip(boxes.chunks_exact(4))
        .filter(|(s, _)| s[1] >= threshold)
        .map(|(s, b)| Candidate {
            x1: b[0].clamp(0.0, 1.0),
            y1: b[1].clamp(0.0, 1.0),
            x2: b[2].clamp(0.0, 1.0),
            y2: b[3].clamp(0.0, 1.0),
            score: s[1],
        })
        .filter(|c| c.area() > 0.0)
        .collect()
}

/// Greedy hard NMS, highest score first.
fn non_maximum_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}
