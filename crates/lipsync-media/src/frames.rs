//! Streaming frame sources.
//!
//! Video frames are decoded by an FFmpeg child writing `rgb24` rawvideo to
//! stdout and read one frame at a time, so memory use does not grow with
//! video length. A still image is repeated for as many frames as the audio
//! needs.

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{collect_stderr, spawn_ffmpeg, FfmpegCommand};
use crate::error::{InputError, MediaError, MediaResult};
use crate::media::MediaKind;
use crate::probe::{probe_video, VideoInfo};
use crate::region::to_rgb;

/// One decoded frame. Frames are shared read-only; compositing makes a new image.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    /// Presentation time in seconds
    pub timestamp: f64,
    pub image: Arc<RgbImage>,
}

/// Geometry and timing of a frame source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frames the source is expected to yield
    pub frame_count: u64,
}

/// Reads rawvideo frames from an FFmpeg child.
pub struct FrameDecoder {
    path: PathBuf,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    fps: f64,
    next_index: u64,
}

impl FrameDecoder {
    /// Start decoding `path` with the geometry reported by ffprobe.
    pub fn spawn(path: &Path, info: &VideoInfo) -> MediaResult<Self> {
        // keep the stored orientation so frames match the probed dimensions
        let cmd = FfmpegCommand::new(path, "pipe:1")
            .input_arg("-noautorotate")
            .raw_rgb24()
            .without_progress();

        let mut child = spawn_ffmpeg(&cmd, Stdio::null(), Stdio::piped())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr_task = collect_stderr(&mut child);

        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            "Started frame decoder"
        );

        Ok(Self {
            path: path.to_path_buf(),
            child,
            stdout: BufReader::new(stdout),
            stderr_task,
            width: info.width,
            height: info.height,
            fps: info.fps,
            next_index: 0,
        })
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Next frame, or `None` at end of stream.
    pub async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        let mut buf = vec![0u8; self.frame_len()];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let image = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| MediaError::internal("decoded frame has the wrong size"))?;
        let index = self.next_index;
        self.next_index += 1;

        Ok(Some(Frame {
            index,
            timestamp: index as f64 / self.fps,
            image: Arc::new(image),
        }))
    }

    /// Wait for FFmpeg to exit; fails only if it produced no frames at all.
    pub async fn finish(mut self) -> MediaResult<u64> {
        let status = self.child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            if self.next_index == 0 {
                return Err(InputError::UnreadableMedia {
                    path: self.path.clone(),
                    reason: if stderr.is_empty() {
                        format!("ffmpeg exited with {:?}", status.code())
                    } else {
                        stderr
                    },
                }
                .into());
            }
            warn!(
                path = %self.path.display(),
                frames = self.next_index,
                "Frame decoder exited with {:?} after partial output",
                status.code()
            );
        }
        Ok(self.next_index)
    }

    /// Stop decoding early and reap the process.
    pub async fn abort(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("Frame decoder already exited: {}", e);
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

enum SourceKind {
    Video(FrameDecoder),
    Still { image: Arc<RgbImage>, next: u64 },
}

/// Frames of a job's media input, with the first frame available up front.
pub struct FrameSource {
    kind: SourceKind,
    info: SourceInfo,
    pending: Option<Frame>,
}

impl FrameSource {
    /// Open a video or still image.
    ///
    /// Still images start with a frame count of one; the pipeline sets the
    /// real count once the audio duration is known.
    pub async fn open(path: &Path, kind: MediaKind, still_fps: f64) -> MediaResult<Self> {
        match kind {
            MediaKind::Video => Self::open_video(path).await,
            MediaKind::StillImage => Self::open_still(path, still_fps).await,
        }
    }

    async fn open_video(path: &Path) -> MediaResult<Self> {
        let info = probe_video(path).await?;
        let mut decoder = FrameDecoder::spawn(path, &info)?;
        let first = decoder.next_frame().await?;

        let Some(first) = first else {
            decoder.finish().await?;
            return Err(InputError::UnreadableMedia {
                path: path.to_path_buf(),
                reason: "no frames decoded".to_string(),
            }
            .into());
        };

        Ok(Self {
            info: SourceInfo {
                width: info.width,
                height: info.height,
                fps: info.fps,
                frame_count: info.frame_count().max(1),
            },
            kind: SourceKind::Video(decoder),
            pending: Some(first),
        })
    }

    async fn open_still(path: &Path, fps: f64) -> MediaResult<Self> {
        let owned = path.to_path_buf();
        let image = tokio::task::spawn_blocking(move || image::open(&owned))
            .await
            .map_err(|e| MediaError::internal(format!("image load task failed: {}", e)))?
            .map_err(|e| InputError::UnreadableMedia {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let image = Arc::new(to_rgb(&image));

        Ok(Self {
            info: SourceInfo {
                width: image.width(),
                height: image.height(),
                fps,
                frame_count: 1,
            },
            kind: SourceKind::Still {
                image: image.clone(),
                next: 1,
            },
            pending: Some(Frame {
                index: 0,
                timestamp: 0.0,
                image,
            }),
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn is_still(&self) -> bool {
        matches!(self.kind, SourceKind::Still { .. })
    }

    /// Fix the number of frames a still image yields.
    pub fn set_still_frame_count(&mut self, frames: u64) {
        if self.is_still() {
            self.info.frame_count = frames.max(1);
        }
    }

    /// The first frame, without consuming it.
    pub fn first_frame(&self) -> Option<&Frame> {
        self.pending.as_ref().filter(|f| f.index == 0)
    }

    pub async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        match &mut self.kind {
            SourceKind::Video(decoder) => decoder.next_frame().await,
            SourceKind::Still { image, next } => {
                if *next >= self.info.frame_count {
                    return Ok(None);
                }
                let index = *next;
                *next += 1;
                Ok(Some(Frame {
                    index,
                    timestamp: index as f64 / self.info.fps,
                    image: image.clone(),
                }))
            }
        }
    }

    /// Up to `max` frames in order; empty at end of stream.
    pub async fn next_batch(&mut self, max: usize) -> MediaResult<Vec<Frame>> {
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.next_frame().await? {
                Some(frame) => batch.push(frame),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Release a fully consumed source, reaping the decoder process.
    pub async fn finish(self) -> MediaResult<()> {
        if let SourceKind::Video(decoder) = self.kind {
            decoder.finish().await?;
        }
        Ok(())
    }

    /// Release the source without reading the remaining frames.
    pub async fn abort(self) {
        if let SourceKind::Video(decoder) = self.kind {
            decoder.abort().await;
        }
    }
}
