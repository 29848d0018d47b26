//! Audio feature extraction and alignment to video frames.
//!
//! The chain is: decode to 16 kHz mono PCM, peak-normalize, log-mel
//! spectrogram, then resample the spectrogram onto the video frame grid.

pub mod align;
pub mod decode;
pub mod mel;

pub use align::{align, AlignedFeatureWindow, AlignedFeatures};
pub use decode::{decode_audio, AudioTrack};
pub use mel::{extract_features, extract_features_from_track, MelFeatureMatrix, MelSpectrogram};

use serde::{Deserialize, Serialize};

/// Constants for the audio front-end.
///
/// The defaults match what the lip-sync generator was trained on; changing
/// them only makes sense together with different weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sampling rate every input is resampled to (Hz).
    pub sample_rate: u32,

    /// STFT window and FFT size in samples.
    pub window_size: usize,

    /// STFT hop in samples.
    pub hop_size: usize,

    /// Number of mel filters.
    pub mel_channels: usize,

    /// Floor applied before the logarithm.
    pub log_floor: f32,

    /// Mel time steps handed to the model per video frame.
    pub mel_window: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            window_size: 800,
            hop_size: 16,
            mel_channels: 80,
            log_floor: 1e-5,
            mel_window: 16,
        }
    }
}

impl AudioConfig {
    /// Builder-style setter for the per-frame mel window width.
    pub fn with_mel_window(mut self, steps: usize) -> Self {
        self.mel_window = steps.max(1);
        self
    }

    /// Builder-style setter for the mel channel count.
    pub fn with_mel_channels(mut self, channels: usize) -> Self {
        self.mel_channels = channels.max(1);
        self
    }

    /// Number of frequency bins produced by the STFT.
    pub fn n_freq(&self) -> usize {
        self.window_size / 2 + 1
    }
}
