//! Input classification, validation and output naming.

use std::path::{Path, PathBuf};

use crate::error::{InputError, MediaResult};

/// Video container extensions accepted as media input.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi"];
/// Still image extensions accepted as media input.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];
/// Audio extensions accepted as audio input.
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "aac", "flac", "ogg"];

/// What kind of visual input a job has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    StillImage,
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

impl MediaKind {
    /// Classify by file extension.
    pub fn from_path(path: &Path) -> Result<Self, InputError> {
        match extension(path) {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => Ok(MediaKind::Video),
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => Ok(MediaKind::StillImage),
            _ => Err(InputError::UnsupportedFormat(format!(
                "{} (expected one of: {}, {})",
                path.display(),
                VIDEO_EXTENSIONS.join(", "),
                IMAGE_EXTENSIONS.join(", ")
            ))),
        }
    }
}

/// Check that both inputs exist and have supported extensions.
pub fn validate_inputs(media: &Path, audio: &Path) -> MediaResult<MediaKind> {
    if !media.is_file() {
        return Err(InputError::FileNotFound(media.to_path_buf()).into());
    }
    if !audio.is_file() {
        return Err(InputError::FileNotFound(audio.to_path_buf()).into());
    }

    let kind = MediaKind::from_path(media)?;

    match extension(audio) {
        Some(ext) if AUDIO_EXTENSIONS.contains(&ext.as_str()) => Ok(kind),
        _ => Err(InputError::UnsupportedFormat(format!(
            "{} (expected one of: {})",
            audio.display(),
            AUDIO_EXTENSIONS.join(", ")
        ))
        .into()),
    }
}

/// `<dir>/<media-stem>_sync_<audio-stem>.mp4`
pub fn default_output_path(media: &Path, audio: &Path, dir: &Path) -> PathBuf {
    let stem = |p: &Path| {
        p.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string())
    };
    dir.join(format!("{}_sync_{}.mp4", stem(media), stem(audio)))
}
