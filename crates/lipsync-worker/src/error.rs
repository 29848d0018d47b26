//! Worker error types.

use lipsync_models::{JobId, JobTransitionError};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid job state: {0}")]
    InvalidState(#[from] JobTransitionError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job store error: {0}")]
    Store(String),

    #[error("Media error: {0}")]
    Media(#[from] lipsync_media::MediaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Stable classification recorded on failed jobs.
    pub fn classification(&self) -> &'static str {
        match self {
            WorkerError::Media(e) => e.classification(),
            WorkerError::JobNotFound(_) | WorkerError::InvalidState(_) => "input",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Store(_) | WorkerError::Json(_) | WorkerError::Io(_) => "internal",
        }
    }
}
