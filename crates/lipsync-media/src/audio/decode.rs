//! Audio decoding to mono PCM through FFmpeg.

use std::path::{Path, PathBuf};
use tempfile::Builder;
use tracing::debug;

use super::AudioConfig;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{InputError, MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Mono PCM samples at a fixed rate, peak-normalized to [-1, 1].
#[derive(Debug, Clone)]
pub struct AudioTrack {
    samples: Vec<f32>,
    sample_rate: u32,
    source: Option<PathBuf>,
}

impl AudioTrack {
    /// Build a track from raw samples, normalizing by the peak amplitude.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Result<Self, InputError> {
        let mut track = Self {
            samples,
            sample_rate,
            source: None,
        };
        track.normalize_peak()?;
        Ok(track)
    }

    fn normalize_peak(&mut self) -> Result<(), InputError> {
        if self.samples.iter().any(|s| !s.is_finite()) {
            return Err(InputError::SilentOrInvalidAudio(
                "audio contains non-finite samples".to_string(),
            ));
        }

        let peak = self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        if peak == 0.0 {
            return Err(InputError::SilentOrInvalidAudio(format!(
                "peak amplitude is zero across {} samples",
                self.samples.len()
            )));
        }

        for s in &mut self.samples {
            *s /= peak;
        }
        Ok(())
    }

    /// Normalized samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// File the track was decoded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Number of output frames this track spans at `fps`, at least one.
    pub fn frame_count(&self, fps: f64) -> u64 {
        // the epsilon keeps 2.0s × 30fps from landing on 59.999…
        let frames = (self.duration_secs() * fps + 1e-6).floor();
        (frames as u64).max(1)
    }
}

/// Decode any audio (or audio-bearing video) file to a normalized mono track.
///
/// `on_progress` receives FFmpeg's `-progress` updates while decoding.
pub async fn decode_audio<F>(
    path: impl AsRef<Path>,
    config: &AudioConfig,
    runner: &FfmpegRunner,
    on_progress: F,
) -> MediaResult<AudioTrack>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(InputError::FileNotFound(path.to_path_buf()).into());
    }

    debug!(
        input = %path.display(),
        sample_rate = config.sample_rate,
        "Decoding audio"
    );

    let raw = Builder::new().prefix("lipsync-audio-").suffix(".f32").tempfile()?;
    let cmd = FfmpegCommand::new(path, raw.path()).raw_mono_f32(config.sample_rate);

    runner.run_with_progress(&cmd, on_progress).await.map_err(|e| match e {
        MediaError::FfmpegFailed {
            message, stderr, ..
        } => InputError::UnreadableAudio {
            path: path.to_path_buf(),
            reason: stderr.unwrap_or(message),
        }
        .into(),
        other => other,
    })?;

    let samples = load_f32le(raw.path()).await?;
    if samples.is_empty() {
        return Err(InputError::UnreadableAudio {
            path: path.to_path_buf(),
            reason: "no audio samples decoded".to_string(),
        }
        .into());
    }

    debug!(samples = samples.len(), "Audio decoded");

    let mut track = AudioTrack::from_samples(samples, config.sample_rate)?;
    track.source = Some(path.to_path_buf());
    Ok(track)
}

/// Load raw f32le samples from a file.
async fn load_f32le(path: &Path) -> MediaResult<Vec<f32>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
