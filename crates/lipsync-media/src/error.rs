//! Error types for the lip-sync pipeline.
//!
//! Failures fall into four families that decide how a job reacts:
//! input and face errors stop a job before any output exists, model errors
//! halt processing immediately, and assembly errors discard the processed
//! frames. A face missing on one video frame is not an error at all; the
//! frame passes through unchanged.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Problems with the supplied media or audio.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unreadable audio {path}: {reason}")]
    UnreadableAudio { path: PathBuf, reason: String },

    #[error("Audio is silent or invalid: {0}")]
    SilentOrInvalidAudio(String),

    #[error("Unreadable media {path}: {reason}")]
    UnreadableMedia { path: PathBuf, reason: String },

    #[error("Feature sequence has {steps} time step(s); at least 2 are needed to interpolate")]
    DegenerateSequence { steps: usize },
}

/// Problems locating or selecting the face to re-render.
#[derive(Debug, Error)]
pub enum FaceError {
    #[error("No face detected in the media")]
    NoFaceDetected,

    #[error("Face index {index} out of range: {count} face(s) detected")]
    FaceIndexOutOfRange { index: usize, count: usize },

    #[error("Face detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("Face detection failed: {0}")]
    DetectionFailed(String),
}

/// Problems with the lip-sync model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Lip-sync model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("Shape mismatch for {input}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        input: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Failed to load model {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

/// Problems writing the output video.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("No frames were produced; refusing to write an empty video")]
    EmptyOutput,

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),
}

/// Errors that can occur during lip-sync processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Face(#[from] FaceError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable error family, stored on failed jobs.
    pub fn classification(&self) -> &'static str {
        match self {
            MediaError::Input(_) | MediaError::Image(_) => "input",
            MediaError::Face(_) => "face",
            MediaError::Model(_) => "model",
            MediaError::Assembly(_) => "assembly",
            MediaError::Cancelled => "cancelled",
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::FfmpegFailed { .. }
            | MediaError::FfprobeFailed { .. }
            | MediaError::Timeout(_)
            | MediaError::Io(_)
            | MediaError::JsonParse(_)
            | MediaError::Internal(_) => "internal",
        }
    }
}
