//! Job executor.
//!
//! Turns CLI requests into persisted [`Job`]s, drives them through the
//! pipeline and records the outcome. A job suspended for face selection is
//! stored and picked up again by [`JobExecutor::resume`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lipsync_media::{
    create_detector, default_output_path, FaceLocator, FaceRegion, LipSyncEngine, LipSyncModel,
    LipSyncPipeline, ModelShape, PipelineEvent, SyncOutcome, SyncRequest,
};
use lipsync_models::{Job, JobFailure, JobId};
use tokio::sync::watch;
use tracing::{debug, info, Instrument};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::job_store::JobStore;
use crate::logging::JobLogger;

/// A new lip-sync job as requested by the caller.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub media: PathBuf,
    pub audio: PathBuf,
    /// Defaults to `<media-stem>_sync_<audio-stem>.mp4` in the current directory
    pub output: Option<PathBuf>,
    pub face_index: Option<usize>,
    pub track_faces: bool,
}

/// Runs jobs and keeps their records.
pub struct JobExecutor {
    config: WorkerConfig,
    store: JobStore,
    pipeline: LipSyncPipeline,
}

impl JobExecutor {
    /// Build the configured detector and model. Weights are loaded lazily.
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let detector = create_detector(config.detector, &config.detector_model_path)?;
        let shape = ModelShape {
            mel_window: config.mel_window,
            ..ModelShape::default()
        };
        let model = LipSyncModel::new(config.model_path.clone(), shape);
        Ok(Self::with_components(
            config,
            FaceLocator::new(detector),
            Arc::new(model),
        ))
    }

    /// Build with explicit detector and engine.
    pub fn with_components(
        config: WorkerConfig,
        locator: FaceLocator,
        engine: Arc<dyn LipSyncEngine>,
    ) -> Self {
        let store = JobStore::new(config.jobs_dir());
        let pipeline = LipSyncPipeline::new(config.pipeline_config(), locator, engine)
            .with_progress(Arc::new(log_event));
        Self {
            config,
            store,
            pipeline,
        }
    }

    /// Stop running jobs between frame batches once `cancel_rx` turns true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.pipeline = self.pipeline.with_cancel(cancel_rx);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Create a job and run it until it finishes or needs a face choice.
    pub async fn process(&self, request: ProcessRequest) -> WorkerResult<Job> {
        let output = match request.output {
            Some(output) => output,
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                default_output_path(&request.media, &request.audio, &cwd)
            }
        };

        let mut job = Job::new(request.media, request.audio, output)
            .with_face_tracking(request.track_faces || self.config.face_tracking);
        if let Some(index) = request.face_index {
            job = job.with_face_index(index);
        }
        job.start()?;
        self.store.save(&job).await?;

        self.run_job(job, "process").await
    }

    /// Continue a suspended job with the chosen face.
    pub async fn resume(&self, job_id: &JobId, face_index: usize) -> WorkerResult<Job> {
        let mut job = self.store.load(job_id).await?;
        job.select_face(face_index)?;
        self.store.save(&job).await?;

        self.run_job(job, "resume").await
    }

    /// Faces on the first frame of `media`.
    pub async fn faces(&self, media: &Path) -> WorkerResult<Vec<FaceRegion>> {
        Ok(self.pipeline.list_faces(media).await?)
    }

    async fn run_job(&self, mut job: Job, operation: &str) -> WorkerResult<Job> {
        let logger = JobLogger::new(&job.id, operation);
        let span = logger.create_span();
        logger.log_start(&format!(
            "{} + {} -> {}",
            job.media_path.display(),
            job.audio_path.display(),
            job.output_path.display()
        ));

        let request = SyncRequest {
            media: job.media_path.clone(),
            audio: job.audio_path.clone(),
            output: job.output_path.clone(),
            face_index: job.face_index,
            track_faces: job.track_faces,
            preview_dir: self.config.job_dir(job.id.as_str()),
        };

        let status = match self.pipeline.run(&request).instrument(span).await {
            Ok(SyncOutcome::Completed(report)) => {
                job.complete(report.frames_total, report.frames_passthrough);
                if report.frames_passthrough > 0 {
                    logger.log_warning(&format!(
                        "{} of {} frames had no face and were kept unchanged",
                        report.frames_passthrough, report.frames_total
                    ));
                }
                logger.log_completion(&format!(
                    "{} frames written to {}",
                    report.frames_total,
                    report.output.display()
                ));
                "succeeded"
            }
            Ok(SyncOutcome::AwaitingFaceSelection(faces)) => {
                logger.log_awaiting_selection(faces.len());
                job.await_selection(faces)?;
                "awaiting_selection"
            }
            Err(e) => {
                let failure = JobFailure::new(e.classification(), e.to_string());
                logger.log_failure(&failure);
                job.fail(failure);
                "failed"
            }
        };

        metrics::counter!("lipsync_jobs_total", "status" => status).increment(1);
        self.store.save(&job).await?;
        info!(job_id = %job.id, state = %job.state, "Job record updated");
        Ok(job)
    }
}

fn log_event(event: PipelineEvent) {
    match event {
        PipelineEvent::AudioDecoding {
            decoded_ms,
            percent,
        } => debug!(decoded_ms, percent, "Decoding audio"),
        PipelineEvent::FramesProcessed { done, total } => {
            debug!(done, total, "Frames processed")
        }
        other => info!(event = ?other, "Pipeline progress"),
    }
}
