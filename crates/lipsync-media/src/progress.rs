//! Progress reporting for FFmpeg runs and lip-sync jobs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Progress information from FFmpeg's `-progress` stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }
}

/// Event emitted while a lip-sync job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Faces were detected on the first frame
    FacesDetected { count: usize },

    /// FFmpeg is decoding the audio; `percent` is known when the input
    /// reports a duration
    AudioDecoding { decoded_ms: i64, percent: Option<f64> },

    /// Audio was decoded and turned into mel features
    AudioPrepared { mel_steps: usize, windows: usize },

    /// A batch of frames has been composited and handed to the encoder
    FramesProcessed { done: u64, total: u64 },

    /// Output file finalized
    Assembled { frames: u64 },
}

impl PipelineEvent {
    /// Fraction of frame work completed, when the event carries one.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            PipelineEvent::FramesProcessed { done, total } if *total > 0 => {
                Some((*done as f64 / *total as f64).min(1.0))
            }
            PipelineEvent::Assembled { .. } => Some(1.0),
            _ => None,
        }
    }
}

/// Progress callback type.
pub type ProgressCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;
