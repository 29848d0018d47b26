//! Output video assembly.
//!
//! Frames are piped as `rgb24` rawvideo into FFmpeg's stdin while the audio
//! file is muxed in as the second input. The encoder writes to a hidden
//! partial file that is moved into place only after FFmpeg exits cleanly.

use image::RgbImage;
use lipsync_models::EncodingConfig;
use std::borrow::Borrow;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{collect_stderr, format_fps, spawn_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::error::{AssemblyError, MediaError, MediaResult};
use crate::fs_utils::{move_file, partial_path, remove_if_exists};

/// Streams frames into an FFmpeg encoder.
pub struct FrameEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    runner: FfmpegRunner,
    output: PathBuf,
    partial: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
}

/// Build the muxing command: video from stdin, audio from `audio`.
pub fn encode_command(
    width: u32,
    height: u32,
    fps: f64,
    audio: &Path,
    output: &Path,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::from_raw_frames(width, height, fps, output)
        .add_input(audio)
        .map("0:v:0")
        .map("1:a:0")
        .frame_rate(fps);

    // yuv420p needs even dimensions; pad by one pixel instead of scaling
    if width % 2 == 1 || height % 2 == 1 {
        cmd = cmd.output_args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"]);
    }

    cmd.output_args(encoding.to_ffmpeg_args())
        .output_args(["-movflags", "+faststart"])
        .without_progress()
}

impl FrameEncoder {
    /// Start an encoder for `width`×`height` frames at a constant `fps`.
    pub async fn spawn(
        width: u32,
        height: u32,
        fps: f64,
        audio: &Path,
        output: &Path,
        encoding: &EncodingConfig,
        runner: FfmpegRunner,
    ) -> MediaResult<Self> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let partial = partial_path(output);
        let cmd = encode_command(width, height, fps, audio, &partial, encoding);
        let mut child = spawn_ffmpeg(&cmd, Stdio::piped(), Stdio::null())?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdin not captured"))?;
        let stderr_task = collect_stderr(&mut child);

        debug!(
            output = %output.display(),
            width,
            height,
            fps = %format_fps(fps),
            "Started frame encoder"
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr_task,
            runner,
            output: output.to_path_buf(),
            partial,
            width,
            height,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append the next frame. Frames must arrive in output order.
    pub async fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(AssemblyError::EncodeFailed(format!(
                "frame {} is {}x{}, encoder expects {}x{}",
                self.frames_written,
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ))
            .into());
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("encoder input already closed"))?;
        if let Err(e) = stdin.write_all(frame.as_raw()).await {
            let mut message = format!(
                "encoder stopped accepting frames after {}: {}",
                self.frames_written, e
            );
            let diagnostics = self.exit_diagnostics().await;
            if !diagnostics.is_empty() {
                message.push('\n');
                message.push_str(&diagnostics);
            }
            return Err(AssemblyError::EncodeFailed(message).into());
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Stderr of an encoder that stopped reading its input.
    async fn exit_diagnostics(&mut self) -> String {
        drop(self.stdin.take());
        let grace = Duration::from_secs(5);
        if tokio::time::timeout(grace, self.child.wait()).await.is_err() {
            warn!("Encoder still running after its input broke");
            return String::new();
        }
        match self.stderr_task.take() {
            Some(task) => tokio::time::timeout(grace, task)
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Close the input, wait for FFmpeg and move the file into place.
    ///
    /// An encoder that never received a frame is aborted with `EmptyOutput`.
    pub async fn finish(mut self) -> MediaResult<u64> {
        if self.frames_written == 0 {
            self.abort().await;
            return Err(AssemblyError::EmptyOutput.into());
        }

        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                warn!("Failed to close encoder input: {}", e);
            }
        }

        let result = self.runner.wait_for_completion(&mut self.child).await;
        let diagnostics = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if let Err(e) = result {
            remove_if_exists(&self.partial).await;
            return Err(match e {
                MediaError::FfmpegFailed { exit_code, .. } => AssemblyError::EncodeFailed(
                    if diagnostics.is_empty() {
                        format!("ffmpeg exited with {:?}", exit_code)
                    } else {
                        diagnostics
                    },
                )
                .into(),
                other => other,
            });
        }

        move_file(&self.partial, &self.output).await?;
        info!(
            output = %self.output.display(),
            frames = self.frames_written,
            "Assembled output video"
        );
        Ok(self.frames_written)
    }

    /// Kill the encoder and remove anything it wrote.
    pub async fn abort(mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.kill().await {
            debug!("Encoder already exited: {}", e);
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        remove_if_exists(&self.partial).await;
    }
}

/// Encode a finite frame sequence with `audio` as the single audio stream.
///
/// Fails with `EmptyOutput` before starting FFmpeg when there are no frames.
pub async fn assemble<I>(
    frames: I,
    fps: f64,
    audio: &Path,
    output: &Path,
    encoding: &EncodingConfig,
    runner: FfmpegRunner,
) -> MediaResult<u64>
where
    I: IntoIterator,
    I::Item: Borrow<RgbImage>,
{
    let mut frames = frames.into_iter().peekable();
    let (width, height) = match frames.peek() {
        Some(first) => Borrow::<RgbImage>::borrow(first).dimensions(),
        None => return Err(AssemblyError::EmptyOutput.into()),
    };

    let mut encoder = FrameEncoder::spawn(width, height, fps, audio, output, encoding, runner).await?;
    for frame in frames {
        if let Err(e) = encoder.write_frame(Borrow::<RgbImage>::borrow(&frame)).await {
            encoder.abort().await;
            return Err(e);
        }
    }
    encoder.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn position(args: &[String], value: &str) -> usize {
        args.iter().position(|a| a == value).unwrap()
    }

    #[test]
    fn test_encode_command_layout() {
        let cmd = encode_command(
            640,
            480,
            25.0,
            Path::new("voice.wav"),
            Path::new("out.mp4"),
            &EncodingConfig::default(),
        );
        let args = cmd.build_args();

        // raw video on stdin is the first input, audio the second
        assert!(position(&args, "rawvideo") < position(&args, "pipe:0"));
        assert!(position(&args, "640x480") < position(&args, "pipe:0"));
        assert!(position(&args, "pipe:0") < position(&args, "voice.wav"));
        assert!(args.contains(&"0:v:0".to_string()));
        assert!(args.contains(&"1:a:0".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_odd_dimensions_are_padded() {
        let cmd = encode_command(
            641,
            480,
            30.0,
            Path::new("voice.wav"),
            Path::new("out.mp4"),
            &EncodingConfig::default(),
        );
        assert!(cmd.build_args().contains(&"-vf".to_string()));
    }

    #[tokio::test]
    async fn test_assemble_without_frames_is_empty_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");
        let frames: Vec<RgbImage> = Vec::new();

        let err = assemble(
            frames,
            30.0,
            &dir.path().join("voice.wav"),
            &output,
            &EncodingConfig::default(),
            FfmpegRunner::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MediaError::Assembly(AssemblyError::EmptyOutput)));
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
    }

    #[tokio::test]
    async fn test_broken_encoder_reports_ffmpeg_stderr() {
        if crate::command::check_ffmpeg().is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let audio = dir.path().join("voice.wav");
        let status = std::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "lavfi", "-i", "anullsrc=r=16000:cl=mono"])
            .args(["-t", "1"])
            .arg(&audio)
            .status()
            .unwrap();
        assert!(status.success());

        let output = dir.path().join("out.mp4");
        let encoding = EncodingConfig {
            codec: "no_such_encoder".to_string(),
            ..EncodingConfig::default()
        };
        let mut encoder = FrameEncoder::spawn(64, 64, 30.0, &audio, &output, &encoding, FfmpegRunner::new())
            .await
            .unwrap();

        let frame = RgbImage::from_pixel(64, 64, image::Rgb([90, 60, 30]));
        let mut failure = None;
        for _ in 0..500 {
            if let Err(e) = encoder.write_frame(&frame).await {
                failure = Some(e);
                break;
            }
        }
        let err = failure.expect("ffmpeg should stop reading frames");
        assert!(matches!(err, MediaError::Assembly(AssemblyError::EncodeFailed(_))));
        assert!(err.to_string().contains("no_such_encoder"), "{err}");

        encoder.abort().await;
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
    }
}
