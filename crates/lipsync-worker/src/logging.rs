//! Structured job logging utilities.

use lipsync_models::{JobFailure, JobId};
use tracing::{error, info, warn, Span};

/// Job logger for structured logging with consistent formatting.
///
/// Every event carries the job id and the operation, so the lifecycle of a
/// job can be followed across `process` and a later `resume`.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            event = "started",
            "Job started: {}", message
        );
    }

    /// The job is suspended until a face is chosen.
    pub fn log_awaiting_selection(&self, faces: usize) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            event = "awaiting_selection",
            faces,
            "Job waiting for face selection"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_failure(&self, failure: &JobFailure) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            event = "failed",
            classification = %failure.classification,
            "Job failed: {}", failure.message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            event = "completed",
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span carrying the job id, entered for the duration of a run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}
