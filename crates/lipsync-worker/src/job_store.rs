//! File-backed job records.
//!
//! Each job is one JSON document `<dir>/<job_id>.json`. Records are replaced
//! atomically so a crash mid-write leaves the previous version intact.

use std::path::{Path, PathBuf};

use lipsync_media::fs_utils::write_atomic;
use lipsync_models::{Job, JobId};
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};

/// Directory of persisted jobs.
#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &JobId) -> WorkerResult<PathBuf> {
        let id = id.as_str();
        // ids become file names
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(WorkerError::store(format!("invalid job id '{}'", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// Write or replace a job record.
    pub async fn save(&self, job: &Job) -> WorkerResult<()> {
        let path = self.path_for(&job.id)?;
        let json = serde_json::to_vec_pretty(job)?;
        write_atomic(&path, json).await?;
        debug!(job_id = %job.id, state = %job.state, "Saved job record");
        Ok(())
    }

    pub async fn load(&self, id: &JobId) -> WorkerResult<Job> {
        let path = self.path_for(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkerError::JobNotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All readable jobs, oldest first. Unreadable records are skipped.
    pub async fn list(&self) -> WorkerResult<Vec<Job>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|e| e == "json")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
            if !is_record {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(WorkerError::from)
                .and_then(|bytes| serde_json::from_slice::<Job>(&bytes).map_err(WorkerError::from));
            match parsed {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(path = %path.display(), "Skipping unreadable job record: {}", e),
            }
        }

        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lipsync_models::{DetectedFace, FaceRect, JobState};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path().join("jobs"));

        let mut job = Job::new("/in/group.mp4", "/in/voice.wav", "/out/group_sync_voice.mp4");
        job.start().unwrap();
        job.await_selection(vec![DetectedFace {
            index: 0,
            rect: FaceRect::new(10, 60, 70, 10).unwrap(),
            preview_path: None,
        }])
        .unwrap();
        tokio_test::assert_ok!(store.save(&job).await);

        let loaded = store.load(&job.id).await.unwrap();
        assert_eq!(loaded.state, JobState::AwaitingFaceSelection);
        assert_eq!(loaded.media_path, job.media_path);
        assert_eq!(loaded.audio_path, job.audio_path);
        assert_eq!(loaded.detected_faces.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_job() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        let err = store.load(&JobId::from_string("nope")).await.unwrap_err();
        assert!(matches!(err, WorkerError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        let err = store.load(&JobId::from_string("../etc/passwd")).await.unwrap_err();
        assert!(matches!(err, WorkerError::Store(_)));
    }

    #[tokio::test]
    async fn test_list_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        assert!(store.list().await.unwrap().is_empty());

        let first = Job::new("a.png", "a.wav", "a.mp4");
        let mut second = Job::new("b.png", "b.wav", "b.mp4");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{").unwrap();

        let jobs = store.list().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, first.id);
    }
}
