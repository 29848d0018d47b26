//! Shared data models for the lip-sync pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs binding a media input and an audio input to one output video
//! - Face rectangles reported by the detector
//! - Encoding configuration for the assembled output

pub mod encoding;
pub mod face;
pub mod job;

// Re-export common types
pub use encoding::EncodingConfig;
pub use face::{FaceRect, FaceRectError};
pub use job::{DetectedFace, Job, JobFailure, JobId, JobState, JobTransitionError};
