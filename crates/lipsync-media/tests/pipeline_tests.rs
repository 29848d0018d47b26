//! Pipeline integration tests.
//!
//! The detector and the generator are replaced by in-memory fakes. Tests that
//! need the ffmpeg binaries return early when they are not installed.

use image::{Rgb, RgbImage};
use lipsync_media::audio::{extract_features_from_track, AudioTrack};
use lipsync_media::fs_utils::partial_path;
use lipsync_media::probe::probe_duration;
use lipsync_media::{
    align, check_ffmpeg, check_ffprobe, probe_video, AlignedFeatureWindow, AudioConfig,
    FaceDetector, FaceError, FaceLocator, InputError, LipSyncEngine, LipSyncModel,
    LipSyncPipeline, MediaError, MediaResult, ModelError, ModelShape, PipelineConfig,
    PipelineEvent, SyncOutcome, SyncRequest,
};
use lipsync_models::{EncodingConfig, FaceRect};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Returns the same rectangles for every image.
struct FixedDetector(Vec<FaceRect>);

impl FaceDetector for FixedDetector {
    fn detect(&self, _image: &RgbImage) -> MediaResult<Vec<FaceRect>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Hands the input face back unchanged.
struct EchoEngine;

impl LipSyncEngine for EchoEngine {
    fn ensure_loaded(&self) -> Result<(), ModelError> {
        Ok(())
    }

    fn synthesize(
        &self,
        face: &RgbImage,
        _window: &AlignedFeatureWindow,
    ) -> Result<RgbImage, ModelError> {
        Ok(face.clone())
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

fn face(top: u32, right: u32, bottom: u32, left: u32) -> FaceRect {
    FaceRect::new(top, right, bottom, left).unwrap()
}

fn pipeline(faces: Vec<FaceRect>, engine: Arc<dyn LipSyncEngine>) -> LipSyncPipeline {
    let locator = FaceLocator::new(Arc::new(FixedDetector(faces)));
    LipSyncPipeline::new(PipelineConfig::default().with_batch_size(8), locator, engine)
}

fn request(dir: &Path, media: PathBuf, audio: PathBuf, face_index: Option<usize>) -> SyncRequest {
    SyncRequest {
        media,
        audio,
        output: dir.join("out").join("result.mp4"),
        face_index,
        track_faces: false,
        preview_dir: dir.join("previews"),
    }
}

fn write_portrait(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(160, 120, |x, y| Rgb([(x % 256) as u8, (y * 2 % 256) as u8, 90]))
        .save(&path)
        .unwrap();
    path
}

fn tone(freq: f32, secs: f32, sample_rate: u32) -> Vec<f32> {
    let n = (secs * sample_rate as f32) as usize;
    (0..n)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

fn ffmpeg_ready() -> bool {
    if check_ffmpeg().is_err() || check_ffprobe().is_err() {
        eprintln!("ffmpeg/ffprobe not installed, skipping");
        return false;
    }
    let encoders = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
        .unwrap_or_default();
    if !encoders.contains("libx264") {
        eprintln!("ffmpeg without libx264, skipping");
        return false;
    }
    true
}

fn ffmpeg(args: &[&str]) {
    let status = Command::new("ffmpeg")
        .args(["-y", "-v", "error"])
        .args(args)
        .status()
        .unwrap();
    assert!(status.success(), "ffmpeg {:?} failed", args);
}

fn lavfi_audio(dir: &Path, name: &str, source: &str, secs: &str) -> PathBuf {
    let path = dir.join(name);
    ffmpeg(&["-f", "lavfi", "-i", source, "-t", secs, "-ac", "1", path.to_str().unwrap()]);
    path
}

#[test]
fn test_features_have_80_channels() {
    let config = AudioConfig::default();
    let track = AudioTrack::from_samples(tone(220.0, 0.5, 16_000), 16_000).unwrap();
    let mel = extract_features_from_track(&track, &config).unwrap();

    assert_eq!(mel.channels(), 80);
    assert_eq!(mel.steps(), 1 + 8_000 / 16);
    assert!(mel.mean().abs() < 1e-3);
}

#[test]
fn test_alignment_yields_one_window_per_frame() {
    let config = AudioConfig::default();
    let track = AudioTrack::from_samples(tone(330.0, 1.0, 16_000), 16_000).unwrap();
    let mel = Arc::new(extract_features_from_track(&track, &config).unwrap());

    let frames = track.frame_count(30.0) as usize;
    assert_eq!(frames, 30);

    let aligned = align(mel, frames, config.mel_window).unwrap();
    let windows: Vec<_> = aligned.iter().collect();
    assert_eq!(windows.len(), 30);
    assert!(windows.windows(2).all(|w| w[0].position < w[1].position));
    assert!(windows.iter().all(|w| w.channels() == 80 && w.width() == 16));
}

#[test]
fn test_silent_samples_are_rejected() {
    let err = AudioTrack::from_samples(vec![0.0; 16_000], 16_000).unwrap_err();
    assert!(matches!(err, InputError::SilentOrInvalidAudio(_)));
}

#[tokio::test]
async fn test_face_index_out_of_range_precedes_audio() {
    let dir = TempDir::new().unwrap();
    let media = write_portrait(dir.path(), "group.png");
    // not real audio: decoding it would fail with UnreadableAudio
    let audio = dir.path().join("voice.wav");
    std::fs::write(&audio, b"RIFF garbage").unwrap();

    let faces = vec![face(10, 40, 50, 5), face(10, 90, 50, 55), face(10, 150, 50, 105)];
    let err = pipeline(faces, Arc::new(EchoEngine))
        .run(&request(dir.path(), media, audio, Some(5)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MediaError::Face(FaceError::FaceIndexOutOfRange { index: 5, count: 3 })
    ));
    assert!(!dir.path().join("out").join("result.mp4").exists());
}

#[tokio::test]
async fn test_no_face_fails_the_job() {
    let dir = TempDir::new().unwrap();
    let media = write_portrait(dir.path(), "empty.png");
    let audio = dir.path().join("voice.wav");
    std::fs::write(&audio, b"x").unwrap();

    let err = pipeline(Vec::new(), Arc::new(EchoEngine))
        .run(&request(dir.path(), media, audio, None))
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Face(FaceError::NoFaceDetected)));
    assert_eq!(err.classification(), "face");
}

#[tokio::test]
async fn test_several_faces_suspend_with_previews() {
    let dir = TempDir::new().unwrap();
    let media = write_portrait(dir.path(), "pair.jpg");
    let audio = dir.path().join("voice.wav");
    std::fs::write(&audio, b"x").unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let pipeline = pipeline(vec![face(10, 60, 70, 10), face(20, 150, 90, 90)], Arc::new(EchoEngine))
        .with_progress(Arc::new(move |event| sink.lock().unwrap().push(event)));

    let outcome = pipeline
        .run(&request(dir.path(), media, audio, None))
        .await
        .unwrap();

    let SyncOutcome::AwaitingFaceSelection(faces) = outcome else {
        panic!("expected a face selection request");
    };
    assert_eq!(faces.len(), 2);
    assert_eq!(faces[1].index, 1);
    for face in &faces {
        assert!(face.preview_path.as_ref().unwrap().is_file());
    }
    assert_eq!(
        events.lock().unwrap().as_slice(),
        &[PipelineEvent::FacesDetected { count: 2 }]
    );
}

#[tokio::test]
async fn test_missing_weights_fail_before_audio() {
    let dir = TempDir::new().unwrap();
    let media = write_portrait(dir.path(), "face.png");
    let audio = dir.path().join("voice.wav");
    std::fs::write(&audio, b"x").unwrap();

    let model = LipSyncModel::new(dir.path().join("missing.onnx"), ModelShape::default());
    let err = pipeline(vec![face(10, 60, 70, 10)], Arc::new(model))
        .run(&request(dir.path(), media, audio, None))
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Model(ModelError::ModelNotLoaded(_))));
}

#[tokio::test]
async fn test_list_faces() {
    let dir = TempDir::new().unwrap();
    let media = write_portrait(dir.path(), "face.bmp");

    let faces = pipeline(vec![face(10, 60, 70, 10), face(0, 400, 300, 100)], Arc::new(EchoEngine))
        .list_faces(&media)
        .await
        .unwrap();

    // the second rectangle is clamped to the 160x120 frame
    assert_eq!(faces.len(), 2);
    assert_eq!(faces[1].rect, face(0, 160, 120, 100));
}

#[tokio::test]
async fn test_silent_audio_leaves_no_output() {
    if !ffmpeg_ready() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let media = write_portrait(dir.path(), "face.png");
    let audio = lavfi_audio(dir.path(), "silence.wav", "anullsrc=r=16000:cl=mono", "1");

    let req = request(dir.path(), media, audio, None);
    let err = pipeline(vec![face(10, 60, 70, 10)], Arc::new(EchoEngine))
        .run(&req)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Input(InputError::SilentOrInvalidAudio(_))));
    assert!(!req.output.exists());
    assert!(!partial_path(&req.output).exists());
}

#[tokio::test]
async fn test_video_keeps_its_frame_count() {
    if !ffmpeg_ready() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let media = dir.path().join("talk.mp4");
    ffmpeg(&[
        "-f",
        "lavfi",
        "-i",
        "testsrc=size=160x120:rate=30",
        "-t",
        "1",
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        media.to_str().unwrap(),
    ]);
    let audio = lavfi_audio(dir.path(), "tone.wav", "sine=frequency=440:sample_rate=16000", "1");

    let req = request(dir.path(), media, audio, Some(0));
    let outcome = pipeline(vec![face(20, 100, 100, 40)], Arc::new(EchoEngine))
        .run(&req)
        .await
        .unwrap();

    let SyncOutcome::Completed(report) = outcome else {
        panic!("expected a finished job");
    };
    assert_eq!(report.frames_total, 30);
    assert_eq!(report.frames_synced, 30);
    assert_eq!(report.frames_passthrough, 0);

    let info = probe_video(&req.output).await.unwrap();
    assert_eq!(info.frame_count(), 30);
    assert_eq!((info.width, info.height), (160, 120));
    assert!(info.has_audio);
}

#[tokio::test]
async fn test_still_image_spans_the_audio() {
    if !ffmpeg_ready() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let media = write_portrait(dir.path(), "portrait.jpg");
    let audio = lavfi_audio(dir.path(), "speech.wav", "sine=frequency=300:sample_rate=16000", "2");

    let req = request(dir.path(), media, audio, None);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let pipeline = LipSyncPipeline::new(
        PipelineConfig::default().with_encoding(EncodingConfig::default().with_crf(23)),
        FaceLocator::new(Arc::new(FixedDetector(vec![face(10, 60, 70, 10)]))),
        Arc::new(EchoEngine),
    )
    .with_progress(Arc::new(move |event| sink.lock().unwrap().push(event)));
    let outcome = pipeline.run(&req).await.unwrap();

    let SyncOutcome::Completed(report) = outcome else {
        panic!("expected a finished job");
    };
    assert_eq!(report.frames_total, 60);

    // audio decode progress arrives before the features are ready
    let events = events.lock().unwrap();
    let decoding: Vec<Option<f64>> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::AudioDecoding { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(!decoding.is_empty());
    let last = decoding.last().unwrap().expect("duration is known for a wav file");
    assert!(last > 90.0 && last <= 100.0, "last decode percentage {last}");
    let prepared = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::AudioPrepared { .. }))
        .unwrap();
    let first_decode = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::AudioDecoding { .. }))
        .unwrap();
    assert!(first_decode < prepared);

    let info = probe_video(&req.output).await.unwrap();
    assert_eq!(info.frame_count(), 60);
    assert!(info.has_audio);
    let duration = probe_duration(&req.output).await.unwrap();
    assert!((duration - 2.0).abs() < 0.1, "duration {duration}");
}

#[tokio::test]
async fn test_cancelled_job_removes_partial_output() {
    if !ffmpeg_ready() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let media = write_portrait(dir.path(), "face.png");
    let audio = lavfi_audio(dir.path(), "tone.wav", "sine=frequency=440:sample_rate=16000", "1");

    let (tx, rx) = tokio::sync::watch::channel(false);
    tx.send(true).unwrap();

    let req = request(dir.path(), media, audio, Some(0));
    let err = pipeline(vec![face(10, 60, 70, 10)], Arc::new(EchoEngine))
        .with_cancel(rx)
        .run(&req)
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Cancelled));
    assert!(!req.output.exists());
    assert!(!partial_path(&req.output).exists());
}
