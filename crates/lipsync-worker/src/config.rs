//! Worker configuration.

use std::path::PathBuf;

use lipsync_media::pipeline::default_batch_size;
use lipsync_media::{AudioConfig, DetectorKind, PipelineConfig};
use lipsync_models::encoding::STILL_IMAGE_FPS;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Job store and scratch files
    pub work_dir: PathBuf,
    /// Lip-sync ONNX weights
    pub model_path: PathBuf,
    /// Face detector weights
    pub detector_model_path: PathBuf,
    /// Face detector backend
    pub detector: DetectorKind,
    /// Output frame rate for still-image jobs
    pub fps: f64,
    /// Frames processed per batch
    pub batch_size: usize,
    /// Mel steps per feature window
    pub mel_window: usize,
    /// Follow the chosen face by overlap by default
    pub face_tracking: bool,
    /// Seconds before an FFmpeg run is killed
    pub ffmpeg_timeout_secs: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/lipsync"),
            model_path: PathBuf::from("weights/wav2lip.onnx"),
            detector_model_path: PathBuf::from("weights/face_detector.onnx"),
            detector: DetectorKind::UltraFace,
            fps: STILL_IMAGE_FPS,
            batch_size: default_batch_size(),
            mel_window: 16,
            face_tracking: false,
            ffmpeg_timeout_secs: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("LIPSYNC_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            model_path: std::env::var("LIPSYNC_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            detector_model_path: std::env::var("LIPSYNC_DETECTOR_MODEL")
                .map(PathBuf::from)
                .unwrap_or(defaults.detector_model_path),
            detector: env_parse("LIPSYNC_DETECTOR").unwrap_or(defaults.detector),
            fps: env_parse::<f64>("LIPSYNC_FPS")
                .filter(|fps| fps.is_finite() && *fps > 0.0)
                .unwrap_or(defaults.fps),
            batch_size: env_parse::<usize>("LIPSYNC_BATCH_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            mel_window: env_parse::<usize>("LIPSYNC_MEL_WINDOW")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.mel_window),
            face_tracking: env_bool("LIPSYNC_FACE_TRACKING").unwrap_or(defaults.face_tracking),
            ffmpeg_timeout_secs: env_parse("LIPSYNC_FFMPEG_TIMEOUT"),
        }
    }

    /// Directory holding persisted job records.
    pub fn jobs_dir(&self) -> PathBuf {
        self.work_dir.join("jobs")
    }

    /// Scratch directory of one job (face previews).
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(job_id)
    }

    /// Pipeline settings derived from this config.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_audio(AudioConfig::default().with_mel_window(self.mel_window))
            .with_still_fps(self.fps)
            .with_batch_size(self.batch_size)
            .with_ffmpeg_timeout(self.ffmpeg_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.work_dir, PathBuf::from("/tmp/lipsync"));
        assert_eq!(config.detector, DetectorKind::UltraFace);
        assert_eq!(config.fps, 30.0);
        assert_eq!(config.mel_window, 16);
        assert!(!config.face_tracking);
        assert!(config.ffmpeg_timeout_secs.is_none());
    }

    #[test]
    fn test_from_env() {
        // every variable read here is unique to this test
        std::env::set_var("LIPSYNC_WORK_DIR", "/var/lipsync");
        std::env::set_var("LIPSYNC_DETECTOR", "yunet");
        std::env::set_var("LIPSYNC_FPS", "25");
        std::env::set_var("LIPSYNC_BATCH_SIZE", "0");
        std::env::set_var("LIPSYNC_FACE_TRACKING", "true");
        std::env::set_var("LIPSYNC_FFMPEG_TIMEOUT", "600");

        let config = WorkerConfig::from_env();
        assert_eq!(config.work_dir, PathBuf::from("/var/lipsync"));
        assert_eq!(config.jobs_dir(), PathBuf::from("/var/lipsync/jobs"));
        assert_eq!(config.detector, DetectorKind::YuNet);
        assert_eq!(config.fps, 25.0);
        assert_eq!(config.batch_size, default_batch_size());
        assert!(config.face_tracking);
        assert_eq!(config.ffmpeg_timeout_secs, Some(600));

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.still_fps, 25.0);
        assert_eq!(pipeline.ffmpeg_timeout_secs, Some(600));

        for var in [
            "LIPSYNC_WORK_DIR",
            "LIPSYNC_DETECTOR",
            "LIPSYNC_FPS",
            "LIPSYNC_BATCH_SIZE",
            "LIPSYNC_FACE_TRACKING",
            "LIPSYNC_FFMPEG_TIMEOUT",
        ] {
            std::env::remove_var(var);
        }
    }
}
