//! Lip-sync generator.
//!
//! The network is an opaque ONNX artifact with a fixed contract:
//! - face input `[1, 96, 96, 3]` (NHWC, RGB) scaled to [-1, 1]
//! - mel input `[1, 80, W, 1]` taken from one aligned feature window
//! - output `[1, 96, 96, 3]` in [-1, 1], mapped back to 8-bit RGB
//!
//! Each call is a single independent forward pass; nothing is carried
//! between frames.

use image::RgbImage;
use once_cell::sync::OnceCell;
use ort::session::Session;
use ort::value::{Tensor, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info};

use crate::audio::AlignedFeatureWindow;
use crate::error::ModelError;
use crate::onnx::{create_session, io_names};
use crate::region::REGION_SIZE;

/// Anything that can turn a face crop plus a feature window into a new face.
pub trait LipSyncEngine: Send + Sync {
    /// Make the engine ready; calling it again is a no-op.
    fn ensure_loaded(&self) -> Result<(), ModelError>;

    /// Produce a synthesized face with the same dimensions as `face`.
    fn synthesize(
        &self,
        face: &RgbImage,
        window: &AlignedFeatureWindow,
    ) -> Result<RgbImage, ModelError>;

    /// Engine name for logging.
    fn name(&self) -> &'static str;
}

/// Tensor geometry the model was exported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelShape {
    pub face_size: u32,
    pub mel_channels: usize,
    pub mel_window: usize,
}

impl Default for ModelShape {
    fn default() -> Self {
        Self {
            face_size: REGION_SIZE,
            mel_channels: 80,
            mel_window: 16,
        }
    }
}

impl ModelShape {
    pub fn face_dims(&self) -> Vec<usize> {
        vec![1, self.face_size as usize, self.face_size as usize, 3]
    }

    pub fn mel_dims(&self) -> Vec<usize> {
        vec![1, self.mel_channels, self.mel_window, 1]
    }
}

struct LoadedModel {
    session: Mutex<Session>,
    face_input: String,
    mel_input: String,
    output: String,
}

/// ONNX-backed generator, loaded at most once.
///
/// Share it through an `Arc`; concurrent first calls to [`ensure_loaded`]
/// block on the same initialization instead of racing.
///
/// [`ensure_loaded`]: LipSyncEngine::ensure_loaded
pub struct LipSyncModel {
    path: PathBuf,
    shape: ModelShape,
    loaded: OnceCell<LoadedModel>,
}

impl LipSyncModel {
    /// Create an unloaded model bound to a weights path.
    pub fn new(path: impl Into<PathBuf>, shape: ModelShape) -> Self {
        Self {
            path: path.into(),
            shape,
            loaded: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shape(&self) -> ModelShape {
        self.shape
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    fn load(&self) -> Result<LoadedModel, ModelError> {
        if !self.path.exists() {
            return Err(ModelError::ModelNotLoaded(format!(
                "weights not found at {}; download the lip-sync ONNX weights first",
                self.path.display()
            )));
        }

        let session = create_session(&self.path, "lip-sync").map_err(|reason| {
            ModelError::LoadFailed {
                path: self.path.clone(),
                reason,
            }
        })?;
        let (inputs, outputs) = io_names(&session);
        let (face_input, mel_input) = resolve_inputs(&inputs).map_err(|reason| {
            ModelError::LoadFailed {
                path: self.path.clone(),
                reason,
            }
        })?;
        let output = outputs.first().cloned().ok_or_else(|| ModelError::LoadFailed {
            path: self.path.clone(),
            reason: "model has no outputs".to_string(),
        })?;

        info!(
            model = %self.path.display(),
            face_input = %face_input,
            mel_input = %mel_input,
            "Lip-sync model loaded"
        );

        Ok(LoadedModel {
            session: Mutex::new(session),
            face_input,
            mel_input,
            output,
        })
    }

    /// Run one forward pass on prepared tensors.
    pub fn infer(&self, face: Vec<f32>, mel: Vec<f32>) -> Result<Vec<f32>, ModelError> {
        let loaded = self
            .loaded
            .get()
            .ok_or_else(|| ModelError::ModelNotLoaded(self.path.display().to_string()))?;

        let face_dims = self.shape.face_dims();
        let mel_dims = self.shape.mel_dims();
        check_len("face", &face_dims, face.len())?;
        check_len("mel", &mel_dims, mel.len())?;

        let face = tensor(face_dims, face)?;
        let mel = tensor(mel_dims, mel)?;

        let mut session = loaded
            .session
            .lock()
            .map_err(|_| ModelError::InferenceFailed("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![
                loaded.face_input.as_str() => face,
                loaded.mel_input.as_str() => mel
            ])
            .map_err(|e| ModelError::InferenceFailed(e.to_string()))?;

        let value = outputs
            .get(loaded.output.as_str())
            .ok_or_else(|| ModelError::InferenceFailed(format!("missing output {}", loaded.output)))?;
        let (_, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(e.to_string()))?;

        let expected = self.shape.face_dims();
        check_len("output", &expected, data.len())?;
        Ok(data.to_vec())
    }
}

impl LipSyncEngine for LipSyncModel {
    fn ensure_loaded(&self) -> Result<(), ModelError> {
        self.loaded.get_or_try_init(|| self.load()).map(|_| ())
    }

    fn synthesize(
        &self,
        face: &RgbImage,
        window: &AlignedFeatureWindow,
    ) -> Result<RgbImage, ModelError> {
        let start = Instant::now();

        let size = self.shape.face_size;
        if face.dimensions() != (size, size) {
            return Err(ModelError::ShapeMismatch {
                input: "face",
                expected: self.shape.face_dims(),
                actual: vec![1, face.height() as usize, face.width() as usize, 3],
            });
        }
        if window.channels() != self.shape.mel_channels || window.width() != self.shape.mel_window {
            return Err(ModelError::ShapeMismatch {
                input: "mel",
                expected: self.shape.mel_dims(),
                actual: vec![1, window.channels(), window.width(), 1],
            });
        }

        let output = self.infer(face_to_tensor(face), window.to_vec())?;
        let synced = tensor_to_face(&output, size)?;

        let elapsed = start.elapsed().as_secs_f64();
        metrics::histogram!("lipsync_inference_seconds").record(elapsed);
        debug!(frame = window.index, elapsed_ms = elapsed * 1000.0, "Synthesized face");

        Ok(synced)
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

fn tensor(dims: Vec<usize>, data: Vec<f32>) -> Result<Value, ModelError> {
    Tensor::from_array((dims, data.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| ModelError::InferenceFailed(format!("failed to create tensor: {}", e)))
}

fn check_len(input: &'static str, dims: &[usize], actual: usize) -> Result<(), ModelError> {
    let expected: usize = dims.iter().product();
    if expected != actual {
        return Err(ModelError::ShapeMismatch {
            input,
            expected: dims.to_vec(),
            actual: vec![actual],
        });
    }
    Ok(())
}

/// Pick the face and mel input names.
///
/// Names mentioning mel/audio are the mel input and names mentioning
/// face/image/video the face input. Unnamed exports follow the usual
/// generator signature `(audio, face)`.
fn resolve_inputs(names: &[String]) -> Result<(String, String), String> {
    if names.len() != 2 {
        return Err(format!("expected 2 inputs, model declares {}", names.len()));
    }
    let is_mel = |n: &str| {
        let n = n.to_ascii_lowercase();
        n.contains("mel") || n.contains("audio")
    };
    let is_face = |n: &str| {
        let n = n.to_ascii_lowercase();
        n.contains("face") || n.contains("image") || n.contains("video")
    };

    let mel = names.iter().position(|n| is_mel(n));
    let face = names.iter().position(|n| is_face(n));
    let (face, mel) = match (face, mel) {
        (Some(f), Some(m)) if f != m => (f, m),
        (Some(f), None) => (f, 1 - f),
        (None, Some(m)) => (1 - m, m),
        _ => (1, 0),
    };
    Ok((names[face].clone(), names[mel].clone()))
}

/// NHWC floats in [-1, 1].
pub fn face_to_tensor(face: &RgbImage) -> Vec<f32> {
    face.as_raw().iter().map(|&v| v as f32 / 127.5 - 1.0).collect()
}

/// Map [-1, 1] NHWC floats back to an RGB image, clamping out-of-range values.
pub fn tensor_to_face(data: &[f32], size: u32) -> Result<RgbImage, ModelError> {
    let pixels: Vec<u8> = data
        .iter()
        .map(|&v| ((v + 1.0) * 127.5).round().clamp(0.0, 255.0) as u8)
        .collect();
    let len = pixels.len();
    RgbImage::from_raw(size, size, pixels).ok_or_else(|| ModelError::ShapeMismatch {
        input: "output",
        expected: vec![1, size as usize, size as usize, 3],
        actual: vec![len],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{align, MelFeatureMatrix};
    use ndarray::Array2;
    use std::sync::Arc;

    fn window(channels: usize, width: usize) -> AlignedFeatureWindow {
        let mel = Arc::new(MelFeatureMatrix::from_array(Array2::zeros((channels, 10))));
        align(mel, 1, width).unwrap().window(0)
    }

    #[test]
    fn test_unloaded_model_refuses_inference() {
        let model = LipSyncModel::new("weights/wav2lip.onnx", ModelShape::default());
        assert!(!model.is_loaded());

        let err = model
            .synthesize(&RgbImage::new(96, 96), &window(80, 16))
            .unwrap_err();
        assert!(matches!(err, ModelError::ModelNotLoaded(_)));
    }

    #[test]
    fn test_missing_weights() {
        let model = LipSyncModel::new("/nonexistent/wav2lip.onnx", ModelShape::default());
        let err = model.ensure_loaded().unwrap_err();
        match err {
            ModelError::ModelNotLoaded(msg) => assert!(msg.contains("/nonexistent/wav2lip.onnx")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!model.is_loaded());
    }

    #[test]
    fn test_shape_mismatch() {
        let model = LipSyncModel::new("weights/wav2lip.onnx", ModelShape::default());

        let err = model
            .synthesize(&RgbImage::new(64, 96), &window(80, 16))
            .unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { input: "face", .. }));

        let err = model
            .synthesize(&RgbImage::new(96, 96), &window(80, 8))
            .unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { input: "mel", .. }));
    }

    #[test]
    fn test_tensor_scaling_roundtrip() {
        let face = RgbImage::from_fn(96, 96, |x, y| image::Rgb([x as u8, y as u8, 255]));
        let tensor = face_to_tensor(&face);
        assert_eq!(tensor.len(), 96 * 96 * 3);
        assert!(tensor.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(tensor_to_face(&tensor, 96).unwrap(), face);
    }

    #[test]
    fn test_output_is_clamped() {
        let data = vec![2.0f32; 4 * 4 * 3];
        assert!(tensor_to_face(&data, 4).unwrap().pixels().all(|p| p.0 == [255, 255, 255]));

        let data = vec![-3.0f32; 4 * 4 * 3];
        assert!(tensor_to_face(&data, 4).unwrap().pixels().all(|p| p.0 == [0, 0, 0]));

        assert!(tensor_to_face(&data, 5).is_err());
    }

    #[test]
    fn test_resolve_inputs() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(
            resolve_inputs(&names(&["face_sequences", "mel_spectrogram"])).unwrap(),
            ("face_sequences".to_string(), "mel_spectrogram".to_string())
        );
        assert_eq!(
            resolve_inputs(&names(&["audio_sequences", "x"])).unwrap(),
            ("x".to_string(), "audio_sequences".to_string())
        );
        assert_eq!(
            resolve_inputs(&names(&["input_0", "input_1"])).unwrap(),
            ("input_1".to_string(), "input_0".to_string())
        );
        assert!(resolve_inputs(&names(&["only"])).is_err());
    }
}
