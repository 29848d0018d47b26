//! Log-mel spectrogram.
//!
//! - Periodic Hann window, centered frames with zero padding
//! - Magnitude STFT via rustfft
//! - Slaney-style mel filter bank with area normalization
//! - Natural log with a floor, then whole-matrix standardization

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::decode::{decode_audio, AudioTrack};
use super::AudioConfig;
use crate::command::FfmpegRunner;
use crate::error::{InputError, MediaResult};
use crate::progress::FfmpegProgress;

/// Normalized log-mel features, shape `[mel_channels, time_steps]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MelFeatureMatrix {
    data: Array2<f32>,
}

impl MelFeatureMatrix {
    /// Wrap an existing `[channels, steps]` array.
    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Mel channel count.
    pub fn channels(&self) -> usize {
        self.data.nrows()
    }

    /// Time step count.
    pub fn steps(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// Mean over every cell.
    pub fn mean(&self) -> f32 {
        self.data.mean().unwrap_or(0.0)
    }

    /// Population standard deviation over every cell.
    pub fn std(&self) -> f32 {
        self.data.std(0.0)
    }
}

#[inline]
fn hz_to_mel(freq: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if freq >= MIN_LOG_HZ {
        MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / logstep
    } else {
        freq / F_SP
    }
}

#[inline]
fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (logstep * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular filters from 0 Hz to Nyquist, shape `[n_mels, n_freq]`.
fn build_mel_filters(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let n_freq = n_fft / 2 + 1;
    let sr = sample_rate as f64;

    let fft_freqs: Vec<f64> = (0..n_freq).map(|k| k as f64 * sr / n_fft as f64).collect();

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(sr / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = Array2::<f32>::zeros((n_mels, n_freq));
    for m in 0..n_mels {
        let lower_width = (mel_points[m + 1] - mel_points[m]).max(1e-10);
        let upper_width = (mel_points[m + 2] - mel_points[m + 1]).max(1e-10);
        let enorm = 2.0 / (mel_points[m + 2] - mel_points[m]).max(1e-10);

        for (f, &freq) in fft_freqs.iter().enumerate() {
            let down = (freq - mel_points[m]) / lower_width;
            let up = (mel_points[m + 2] - freq) / upper_width;
            let weight = down.min(up).max(0.0);
            filters[[m, f]] = (weight * enorm) as f32;
        }
    }
    filters
}

/// Periodic Hann: 0.5 * (1 - cos(2πn/N)).
fn build_hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| (0.5 * (1.0 - (2.0 * PI * n as f64 / size as f64).cos())) as f32)
        .collect()
}

/// Reusable spectrogram front-end; filters and FFT plan are built once.
pub struct MelSpectrogram {
    config: AudioConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    filters: Array2<f32>,
}

impl MelSpectrogram {
    pub fn new(config: AudioConfig) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.window_size);
        let window = build_hann_window(config.window_size);
        let filters = build_mel_filters(config.sample_rate, config.window_size, config.mel_channels);
        Self {
            config,
            fft,
            window,
            filters,
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Number of STFT frames for `len` samples with centered framing.
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.config.hop_size
    }

    /// Magnitude STFT, shape `[n_freq, frames]`.
    fn magnitude_stft(&self, samples: &[f32]) -> Array2<f32> {
        let n_fft = self.config.window_size;
        let hop = self.config.hop_size;
        let n_freq = self.config.n_freq();
        let pad = n_fft / 2;
        let frames = self.frame_count(samples.len());

        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let columns: Vec<Vec<f32>> = (0..frames)
            .into_par_iter()
            .map_init(
                || {
                    (
                        vec![Complex32::new(0.0, 0.0); n_fft],
                        vec![Complex32::new(0.0, 0.0); self.fft.get_inplace_scratch_len()],
                    )
                },
                |(buf, scratch), t| {
                    let start = t * hop;
                    for (n, dst) in buf.iter_mut().enumerate() {
                        let x = padded.get(start + n).copied().unwrap_or(0.0);
                        *dst = Complex32::new(x * self.window[n], 0.0);
                    }
                    self.fft.process_with_scratch(buf, scratch);
                    buf[..n_freq].iter().map(|c| c.norm()).collect()
                },
            )
            .collect();

        let mut mag = Array2::<f32>::zeros((n_freq, frames));
        for (t, column) in columns.into_iter().enumerate() {
            for (f, value) in column.into_iter().enumerate() {
                mag[[f, t]] = value;
            }
        }
        mag
    }

    /// Compute normalized log-mel features for a normalized track.
    pub fn compute(&self, samples: &[f32]) -> Result<MelFeatureMatrix, InputError> {
        if samples.is_empty() {
            return Err(InputError::SilentOrInvalidAudio("no samples".to_string()));
        }

        let mag = self.magnitude_stft(samples);
        let floor = self.config.log_floor;
        let mut mel = self.filters.dot(&mag);
        mel.mapv_inplace(|v| v.max(floor).ln());

        let mean = mel.mean().unwrap_or(0.0);
        let std = mel.std(0.0);
        if !std.is_finite() || std == 0.0 {
            return Err(InputError::SilentOrInvalidAudio(format!(
                "mel spectrogram has no variance (std = {})",
                std
            )));
        }
        mel.mapv_inplace(|v| (v - mean) / std);

        debug!(
            channels = mel.len_of(Axis(0)),
            steps = mel.len_of(Axis(1)),
            "Computed mel features"
        );

        Ok(MelFeatureMatrix::from_array(mel))
    }
}

/// Mel features for an already decoded track.
pub fn extract_features_from_track(
    track: &AudioTrack,
    config: &AudioConfig,
) -> Result<MelFeatureMatrix, InputError> {
    MelSpectrogram::new(config.clone()).compute(track.samples())
}

/// Decode `audio_path` and compute its mel features.
///
/// Returns the decoded track alongside so callers can derive durations.
pub async fn extract_features<F>(
    audio_path: impl AsRef<Path>,
    config: &AudioConfig,
    runner: &FfmpegRunner,
    on_progress: F,
) -> MediaResult<(AudioTrack, MelFeatureMatrix)>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let track = decode_audio(audio_path, config, runner, on_progress).await?;
    let config = config.clone();
    let (track, features) = tokio::task::spawn_blocking(move || {
        let features = extract_features_from_track(&track, &config);
        (track, features)
    })
    .await
    .map_err(|e| crate::error::MediaError::internal(format!("mel task failed: {}", e)))?;
    Ok((track, features?))
}
