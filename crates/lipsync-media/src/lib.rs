#![deny(unreachable_patterns)]
//! Audio-driven lip-sync pipeline over the FFmpeg CLI.
//!
//! This crate provides:
//! - Mel feature extraction and alignment to video frames
//! - Face location with pluggable detector backends
//! - ONNX lip-sync inference and soft-mask compositing
//! - Streaming frame decode/encode through FFmpeg pipes
//! - Job orchestration with cancellation and progress events

pub mod assembler;
pub mod audio;
pub mod command;
pub mod compositor;
pub mod error;
pub mod face;
pub mod frames;
pub mod fs_utils;
pub mod media;
pub mod model;
mod onnx;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod region;

pub use assembler::{assemble, FrameEncoder};
pub use audio::{
    align, decode_audio, extract_features, AlignedFeatureWindow, AlignedFeatures, AudioConfig,
    AudioTrack, MelFeatureMatrix,
};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compositor::{blend, blend_with_mask, build_mask};
pub use error::{AssemblyError, FaceError, InputError, MediaError, MediaResult, ModelError};
pub use face::{create_detector, DetectorKind, FaceDetector, FaceLocator, FaceRegion, FaceSelector};
pub use frames::{Frame, FrameDecoder, FrameSource};
pub use media::{default_output_path, validate_inputs, MediaKind};
pub use model::{LipSyncEngine, LipSyncModel, ModelShape};
pub use pipeline::{LipSyncPipeline, PipelineConfig, SyncOutcome, SyncReport, SyncRequest};
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, PipelineEvent, ProgressCallback};
pub use region::{extract, REGION_SIZE};

/// Frame rate assumed when a stream does not report one.
pub const DEFAULT_FPS: f64 = lipsync_models::encoding::STILL_IMAGE_FPS;
