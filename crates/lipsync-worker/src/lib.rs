//! Lip-sync job runner.
//!
//! This crate provides:
//! - Environment-driven configuration
//! - File-backed job records that survive the face-selection suspension
//! - Job execution with structured lifecycle logging and metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod job_store;
pub mod logging;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, ProcessRequest};
pub use job_store::JobStore;
pub use logging::JobLogger;
