//! Resampling of mel features onto the video frame grid.
//!
//! Frame `i` of `N` maps to the fractional mel position
//! `p_i = i × (steps − 1) / (N − 1)`, i.e. evenly spaced samples over the
//! whole mel index domain. Each window gathers `mel_window` columns centered
//! on `p_i`, linearly interpolated and clamped at the edges. With a window of
//! one column this is plain per-channel linear resampling.
//!
//! When `N` comes from an existing video rather than the audio duration this
//! stretches the audio onto the video and is only approximately time-aligned.

use ndarray::{Array2, ArrayView2};
use std::sync::Arc;

use super::mel::MelFeatureMatrix;
use crate::error::InputError;

/// Features aligned to one output frame, shape `[channels, width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFeatureWindow {
    /// Output frame index
    pub index: usize,
    /// Fractional mel position the window is centered on
    pub position: f64,
    data: Array2<f32>,
}

impl AlignedFeatureWindow {
    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    /// Row-major `[channels, width]` values.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Exactly `len()` windows, one per output frame, produced on demand.
#[derive(Debug, Clone)]
pub struct AlignedFeatures {
    mel: Arc<MelFeatureMatrix>,
    count: usize,
    width: usize,
}

impl AlignedFeatures {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Fractional mel position for frame `index`.
    pub fn position(&self, index: usize) -> f64 {
        let last = (self.mel.steps() - 1) as f64;
        if self.count <= 1 {
            return 0.0;
        }
        let index = index.min(self.count - 1);
        index as f64 * last / (self.count - 1) as f64
    }

    /// Window for frame `index`; indices past the end reuse the last window.
    pub fn window(&self, index: usize) -> AlignedFeatureWindow {
        let index = index.min(self.count.saturating_sub(1));
        let position = self.position(index);
        let mel = self.mel.view();
        let channels = mel.nrows();
        let last = (mel.ncols() - 1) as f64;
        let half = (self.width / 2) as f64;

        let mut data = Array2::<f32>::zeros((channels, self.width));
        for k in 0..self.width {
            let t = (position + k as f64 - half).clamp(0.0, last);
            let lo = t.floor() as usize;
            let hi = (lo + 1).min(mel.ncols() - 1);
            let frac = (t - lo as f64) as f32;
            for c in 0..channels {
                let a = mel[[c, lo]];
                let b = mel[[c, hi]];
                data[[c, k]] = a + (b - a) * frac;
            }
        }

        AlignedFeatureWindow {
            index,
            position,
            data,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = AlignedFeatureWindow> + '_ {
        (0..self.count).map(move |i| self.window(i))
    }
}

/// Align `mel` to `target_frames` output frames with windows `width` columns wide.
pub fn align(
    mel: Arc<MelFeatureMatrix>,
    target_frames: usize,
    width: usize,
) -> Result<AlignedFeatures, InputError> {
    if mel.steps() < 2 {
        return Err(InputError::DegenerateSequence { steps: mel.steps() });
    }
    Ok(AlignedFeatures {
        mel,
        count: target_frames,
        width: width.max(1),
    })
}
