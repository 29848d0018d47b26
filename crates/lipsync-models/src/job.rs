//! Lip-sync job definitions.
//!
//! A job binds one media input and one audio input (plus a face choice) to a
//! single output video. Jobs are never retried: once `Succeeded` or `Failed`
//! they stay there.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::FaceRect;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, nothing decoded yet
    #[default]
    Pending,
    /// Several faces were found and the caller must pick one
    AwaitingFaceSelection,
    /// Audio and frames are being processed
    Processing,
    /// Output video was written
    Succeeded,
    /// Job failed; see `Job::failure`
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::AwaitingFaceSelection => "awaiting_face_selection",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error classification plus human-readable cause for a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    /// Stable error family (`input`, `face`, `model`, `assembly`, ...)
    pub classification: String,
    /// Message describing what to fix
    pub message: String,
}

impl JobFailure {
    pub fn new(classification: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            classification: classification.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.classification, self.message)
    }
}

/// A face offered to the caller while a job awaits selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedFace {
    /// Positional index in detector order
    pub index: usize,
    /// Rectangle in the first frame
    pub rect: FaceRect,
    /// JPEG crop written for preview, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<PathBuf>,
}

/// Invalid job state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} job {job_id} in state {state}")]
pub struct JobTransitionError {
    pub job_id: JobId,
    pub state: JobState,
    pub action: &'static str,
}

/// A lip-sync job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Video or still image to re-render
    pub media_path: PathBuf,

    /// Audio track driving the mouth motion
    pub audio_path: PathBuf,

    /// Where the output video is written
    pub output_path: PathBuf,

    /// Selected face; `None` lets the job ask when several faces exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_index: Option<usize>,

    /// Follow the selected face by overlap instead of by position
    #[serde(default)]
    pub track_faces: bool,

    /// Job state
    #[serde(default)]
    pub state: JobState,

    /// Faces found in the first frame (filled when awaiting selection)
    #[serde(default)]
    pub detected_faces: Vec<DetectedFace>,

    /// Failure details (if failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,

    /// Frames written to the output
    #[serde(default)]
    pub frames_total: u64,

    /// Frames that passed through unchanged because no face was found
    #[serde(default)]
    pub frames_passthrough: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        media_path: impl Into<PathBuf>,
        audio_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            media_path: media_path.into(),
            audio_path: audio_path.into(),
            output_path: output_path.into(),
            face_index: None,
            track_faces: false,
            state: JobState::Pending,
            detected_faces: Vec::new(),
            failure: None,
            frames_total: 0,
            frames_passthrough: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Select a face up front.
    pub fn with_face_index(mut self, index: usize) -> Self {
        self.face_index = Some(index);
        self
    }

    /// Enable overlap-based face tracking.
    pub fn with_face_tracking(mut self, enabled: bool) -> Self {
        self.track_faces = enabled;
        self
    }

    fn transition_error(&self, action: &'static str) -> JobTransitionError {
        JobTransitionError {
            job_id: self.id.clone(),
            state: self.state,
            action,
        }
    }

    /// Start processing the job.
    pub fn start(&mut self) -> Result<(), JobTransitionError> {
        if self.state != JobState::Pending {
            return Err(self.transition_error("start"));
        }
        self.state = JobState::Processing;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Suspend the job until a face is chosen.
    pub fn await_selection(&mut self, faces: Vec<DetectedFace>) -> Result<(), JobTransitionError> {
        if self.state != JobState::Processing {
            return Err(self.transition_error("suspend"));
        }
        self.state = JobState::AwaitingFaceSelection;
        self.detected_faces = faces;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Resume a suspended job with the chosen face.
    pub fn select_face(&mut self, index: usize) -> Result<(), JobTransitionError> {
        if self.state != JobState::AwaitingFaceSelection {
            return Err(self.transition_error("resume"));
        }
        self.face_index = Some(index);
        self.state = JobState::Processing;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark job as succeeded.
    pub fn complete(&mut self, frames_total: u64, frames_passthrough: u64) {
        self.state = JobState::Succeeded;
        self.frames_total = frames_total;
        self.frames_passthrough = frames_passthrough;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Mark job as failed.
    pub fn fail(&mut self, failure: JobFailure) {
        self.state = JobState::Failed;
        self.failure = Some(failure);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}
