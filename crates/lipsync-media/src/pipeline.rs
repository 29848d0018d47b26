//! Job orchestration.
//!
//! ```text
//! validate -> decode first frame -> detect faces
//!   0 faces  -> NoFaceDetected
//!   >1 faces without a chosen index -> AwaitingFaceSelection (previews written)
//!   otherwise -> audio features -> align -> per-frame batches -> assemble
//! ```
//!
//! Frames stream through in fixed-size batches: the batch is decoded, its
//! faces are detected and synthesized on the rayon pool, and the finished
//! frames are written to the encoder in index order before the next batch is
//! read.

use image::RgbImage;
use lipsync_models::encoding::STILL_IMAGE_FPS;
use lipsync_models::{DetectedFace, EncodingConfig, FaceRect};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::assembler::FrameEncoder;
use crate::audio::{align, extract_features, AlignedFeatures, AudioConfig};
use crate::command::FfmpegRunner;
use crate::compositor::blend;
use crate::error::{FaceError, MediaError, MediaResult};
use crate::face::locator::select;
use crate::face::{write_face_previews, FaceLocator, FaceRegion, FaceSelector};
use crate::frames::{Frame, FrameSource};
use crate::media::{validate_inputs, MediaKind};
use crate::model::LipSyncEngine;
use crate::probe::probe_duration;
use crate::progress::{FfmpegProgress, PipelineEvent, ProgressCallback};
use crate::region::{extract, REGION_SIZE};

/// Pipeline-wide settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Audio front-end constants
    pub audio: AudioConfig,
    /// Output frame rate for still-image inputs
    pub still_fps: f64,
    /// Frames decoded and processed together
    pub batch_size: usize,
    /// Output encoding
    pub encoding: EncodingConfig,
    /// Seconds before an FFmpeg run is killed
    pub ffmpeg_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            still_fps: STILL_IMAGE_FPS,
            batch_size: default_batch_size(),
            encoding: EncodingConfig::default(),
            ffmpeg_timeout_secs: None,
        }
    }
}

/// Two frames in flight per core.
pub fn default_batch_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(8)
}

impl PipelineConfig {
    pub fn with_audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_still_fps(mut self, fps: f64) -> Self {
        if fps.is_finite() && fps > 0.0 {
            self.still_fps = fps;
        }
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_ffmpeg_timeout(mut self, secs: Option<u64>) -> Self {
        self.ffmpeg_timeout_secs = secs;
        self
    }
}

/// Inputs of one lip-sync run.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub media: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    /// Positional face index; `None` asks when several faces are found
    pub face_index: Option<usize>,
    /// Follow the chosen face by overlap instead of by index
    pub track_faces: bool,
    /// Where face previews go when a selection is needed
    pub preview_dir: PathBuf,
}

/// Counts for a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub output: PathBuf,
    pub fps: f64,
    pub frames_total: u64,
    pub frames_synced: u64,
    pub frames_passthrough: u64,
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Output written
    Completed(SyncReport),
    /// Several faces found and none chosen; nothing was written but previews
    AwaitingFaceSelection(Vec<DetectedFace>),
}

/// A frame after compositing.
#[derive(Debug, Clone)]
pub enum ProcessedFrame {
    Synced(RgbImage),
    /// No usable face on this frame; the original is kept
    Passthrough(Arc<RgbImage>),
}

impl ProcessedFrame {
    pub fn image(&self) -> &RgbImage {
        match self {
            ProcessedFrame::Synced(image) => image,
            ProcessedFrame::Passthrough(image) => image,
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, ProcessedFrame::Synced(_))
    }
}

/// Per-frame work shared by every batch of a run.
#[derive(Clone)]
pub struct FrameProcessor {
    locator: FaceLocator,
    engine: Arc<dyn LipSyncEngine>,
    features: Arc<AlignedFeatures>,
    /// Reused for every frame of a still image instead of re-detecting
    fixed_regions: Option<Arc<Vec<FaceRegion>>>,
}

impl FrameProcessor {
    pub fn new(
        locator: FaceLocator,
        engine: Arc<dyn LipSyncEngine>,
        features: Arc<AlignedFeatures>,
    ) -> Self {
        Self {
            locator,
            engine,
            features,
            fixed_regions: None,
        }
    }

    /// Skip detection and use `regions` on every frame.
    pub fn with_fixed_regions(mut self, regions: Vec<FaceRegion>) -> Self {
        self.fixed_regions = Some(Arc::new(regions));
        self
    }

    /// Process one batch in order.
    ///
    /// Detection and synthesis run in parallel; face selection walks the
    /// frames sequentially because tracking depends on the previous frame.
    pub fn process_batch(
        &self,
        frames: &[Frame],
        selector: &mut FaceSelector,
    ) -> MediaResult<Vec<ProcessedFrame>> {
        let detections: Vec<Arc<Vec<FaceRegion>>> = match &self.fixed_regions {
            Some(regions) => vec![regions.clone(); frames.len()],
            None => frames
                .par_iter()
                .map(|frame| self.locator.locate(&frame.image).map(Arc::new))
                .collect::<MediaResult<_>>()?,
        };

        let targets: Vec<Option<FaceRect>> = detections
            .iter()
            .map(|regions| selector.select(regions))
            .collect();

        frames
            .par_iter()
            .zip(targets.par_iter())
            .map(|(frame, target)| match target {
                Some(rect) => self.sync_frame(frame, *rect).map(ProcessedFrame::Synced),
                None => {
                    debug!(frame = frame.index, "No face on frame, passing through");
                    Ok(ProcessedFrame::Passthrough(frame.image.clone()))
                }
            })
            .collect()
    }

    fn sync_frame(&self, frame: &Frame, rect: FaceRect) -> MediaResult<RgbImage> {
        let region = extract(&frame.image, rect, REGION_SIZE);
        let window = self.features.window(frame.index as usize);
        let synced = self.engine.synthesize(&region, &window)?;
        Ok(blend(&frame.image, &synced, rect))
    }
}

#[derive(Debug, Default)]
struct FrameCounts {
    synced: u64,
    passthrough: u64,
}

/// Runs lip-sync jobs end to end.
pub struct LipSyncPipeline {
    config: PipelineConfig,
    locator: FaceLocator,
    engine: Arc<dyn LipSyncEngine>,
    progress: Option<ProgressCallback>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl LipSyncPipeline {
    pub fn new(config: PipelineConfig, locator: FaceLocator, engine: Arc<dyn LipSyncEngine>) -> Self {
        Self {
            config,
            locator,
            engine,
            progress: None,
            cancel_rx: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Stop between batches once `cancel_rx` turns true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    /// Forwards FFmpeg's audio decode progress as [`PipelineEvent::AudioDecoding`].
    async fn decode_progress(&self, audio: &Path) -> impl Fn(FfmpegProgress) + Send + 'static {
        let callback = self.progress.clone();
        let total_ms = match &callback {
            Some(_) => probe_duration(audio)
                .await
                .ok()
                .map(|secs| (secs * 1000.0).round() as i64)
                .filter(|ms| *ms > 0),
            None => None,
        };
        move |progress: FfmpegProgress| {
            if let Some(callback) = &callback {
                callback(PipelineEvent::AudioDecoding {
                    decoded_ms: progress.out_time_ms,
                    percent: total_ms.map(|total| progress.percentage(total)),
                });
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    fn runner(&self) -> FfmpegRunner {
        let runner = FfmpegRunner::new().with_optional_timeout(self.config.ffmpeg_timeout_secs);
        match &self.cancel_rx {
            Some(rx) => runner.with_cancel(rx.clone()),
            None => runner,
        }
    }

    /// Faces on the first frame of `media`, without running a job.
    pub async fn list_faces(&self, media: &Path) -> MediaResult<Vec<FaceRegion>> {
        if !media.is_file() {
            return Err(crate::error::InputError::FileNotFound(media.to_path_buf()).into());
        }
        let kind = MediaKind::from_path(media)?;
        let source = FrameSource::open(media, kind, self.config.still_fps).await?;
        let regions = self.locate_first(&source).await;
        source.abort().await;
        regions
    }

    async fn locate_first(&self, source: &FrameSource) -> MediaResult<Vec<FaceRegion>> {
        let first = source
            .first_frame()
            .map(|f| f.image.clone())
            .ok_or_else(|| MediaError::internal("first frame already consumed"))?;
        let locator = self.locator.clone();
        run_blocking(move || locator.locate(&first)).await
    }

    /// Run one job to completion or to the face-selection suspension point.
    pub async fn run(&self, request: &SyncRequest) -> MediaResult<SyncOutcome> {
        let kind = validate_inputs(&request.media, &request.audio)?;
        let mut source = FrameSource::open(&request.media, kind, self.config.still_fps).await?;

        let regions = match self.locate_first(&source).await {
            Ok(regions) => regions,
            Err(e) => {
                source.abort().await;
                return Err(e);
            }
        };
        info!(
            media = %request.media.display(),
            faces = regions.len(),
            detector = self.locator.detector_name(),
            "Detected faces on first frame"
        );
        self.emit(PipelineEvent::FacesDetected {
            count: regions.len(),
        });

        let chosen = match choose_face(&regions, request.face_index) {
            Ok(Some(region)) => region,
            Ok(None) => {
                let first = source
                    .first_frame()
                    .map(|f| f.image.clone())
                    .ok_or_else(|| MediaError::internal("first frame already consumed"))?;
                source.abort().await;
                let dir = request.preview_dir.clone();
                let faces = run_blocking(move || write_face_previews(&first, &regions, &dir)).await?;
                info!(faces = faces.len(), "Several faces found, waiting for a selection");
                return Ok(SyncOutcome::AwaitingFaceSelection(faces));
            }
            Err(e) => {
                source.abort().await;
                return Err(e.into());
            }
        };

        match self.sync(request, &mut source, &regions, chosen).await {
            Ok(report) => {
                source.finish().await?;
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                source.abort().await;
                Err(e)
            }
        }
    }

    async fn sync(
        &self,
        request: &SyncRequest,
        source: &mut FrameSource,
        regions: &[FaceRegion],
        chosen: FaceRegion,
    ) -> MediaResult<SyncReport> {
        let engine = self.engine.clone();
        run_blocking(move || engine.ensure_loaded().map_err(MediaError::from)).await?;

        let runner = self.runner();
        let (track, mel) = extract_features(
            &request.audio,
            &self.config.audio,
            &runner,
            self.decode_progress(&request.audio).await,
        )
        .await?;

        if source.is_still() {
            source.set_still_frame_count(track.frame_count(source.info().fps));
        }
        let info = source.info().clone();
        let mel_steps = mel.steps();
        let features = Arc::new(align(
            Arc::new(mel),
            info.frame_count as usize,
            self.config.audio.mel_window,
        )?);
        debug!(
            mel_steps,
            frames = info.frame_count,
            duration = track.duration_secs(),
            "Aligned audio features"
        );
        self.emit(PipelineEvent::AudioPrepared {
            mel_steps,
            windows: features.len(),
        });

        let mut processor = FrameProcessor::new(self.locator.clone(), self.engine.clone(), features);
        if source.is_still() {
            processor = processor.with_fixed_regions(regions.to_vec());
        }
        let selector = if request.track_faces {
            FaceSelector::tracked(chosen.rect)
        } else {
            FaceSelector::positional(chosen.index)
        };

        let mut encoder = FrameEncoder::spawn(
            info.width,
            info.height,
            info.fps,
            &request.audio,
            &request.output,
            &self.config.encoding,
            runner,
        )
        .await?;

        let counts = match self
            .stream_frames(source, &mut encoder, processor, selector, info.frame_count)
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                encoder.abort().await;
                return Err(e);
            }
        };

        let frames_total = encoder.finish().await?;
        self.emit(PipelineEvent::Assembled {
            frames: frames_total,
        });

        if counts.passthrough > 0 {
            warn!(
                passthrough = counts.passthrough,
                total = frames_total,
                "Some frames had no face and were left unchanged"
            );
        }

        Ok(SyncReport {
            output: request.output.clone(),
            fps: info.fps,
            frames_total,
            frames_synced: counts.synced,
            frames_passthrough: counts.passthrough,
        })
    }

    async fn stream_frames(
        &self,
        source: &mut FrameSource,
        encoder: &mut FrameEncoder,
        processor: FrameProcessor,
        mut selector: FaceSelector,
        expected: u64,
    ) -> MediaResult<FrameCounts> {
        let mut counts = FrameCounts::default();
        let mut done = 0u64;

        loop {
            if self.is_cancelled() {
                info!(frames = done, "Cancelled between batches");
                return Err(MediaError::Cancelled);
            }

            let batch = source.next_batch(self.config.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let worker = processor.clone();
            let (processed, returned) = run_blocking(move || {
                let processed = worker.process_batch(&batch, &mut selector)?;
                Ok((processed, selector))
            })
            .await?;
            selector = returned;

            for frame in &processed {
                encoder.write_frame(frame.image()).await?;
                if frame.is_synced() {
                    counts.synced += 1;
                } else {
                    counts.passthrough += 1;
                }
            }

            let synced = processed.iter().filter(|f| f.is_synced()).count() as u64;
            let n = processed.len() as u64;
            metrics::counter!("lipsync_frames_total").increment(n);
            metrics::counter!("lipsync_frames_synced_total").increment(synced);
            metrics::counter!("lipsync_frames_passthrough_total").increment(n - synced);

            done += n;
            self.emit(PipelineEvent::FramesProcessed {
                done,
                total: expected.max(done),
            });
        }

        Ok(counts)
    }
}

/// Resolve the face to sync from the first-frame detections.
///
/// `Ok(None)` means the caller has to choose.
pub fn choose_face(
    regions: &[FaceRegion],
    face_index: Option<usize>,
) -> Result<Option<FaceRegion>, FaceError> {
    if regions.is_empty() {
        return Err(FaceError::NoFaceDetected);
    }
    match face_index {
        Some(index) => select(regions, index).map(Some),
        None if regions.len() == 1 => Ok(Some(regions[0])),
        None => Ok(None),
    }
}

async fn run_blocking<T, F>(f: F) -> MediaResult<T>
where
    F: FnOnce() -> MediaResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MediaError::internal(format!("blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AlignedFeatureWindow, MelFeatureMatrix};
    use crate::error::ModelError;
    use crate::face::FaceDetector;
    use image::Rgb;
    use ndarray::Array2;

    struct Fixed(Vec<FaceRect>);

    impl FaceDetector for Fixed {
        fn detect(&self, _image: &RgbImage) -> MediaResult<Vec<FaceRect>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    /// Paints every synthesized face white.
    struct White;

    impl LipSyncEngine for White {
        fn ensure_loaded(&self) -> Result<(), ModelError> {
            Ok(())
        }

        fn synthesize(
            &self,
            face: &RgbImage,
            _window: &AlignedFeatureWindow,
        ) -> Result<RgbImage, ModelError> {
            Ok(RgbImage::from_pixel(face.width(), face.height(), Rgb([255, 255, 255])))
        }

        fn name(&self) -> &'static str {
            "white"
        }
    }

    struct Broken;

    impl LipSyncEngine for Broken {
        fn ensure_loaded(&self) -> Result<(), ModelError> {
            Ok(())
        }

        fn synthesize(
            &self,
            _face: &RgbImage,
            window: &AlignedFeatureWindow,
        ) -> Result<RgbImage, ModelError> {
            Err(ModelError::ShapeMismatch {
                input: "mel",
                expected: vec![1, 80, 16, 1],
                actual: vec![1, window.channels(), window.width(), 1],
            })
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn rect(top: u32, right: u32, bottom: u32, left: u32) -> FaceRect {
        FaceRect::new(top, right, bottom, left).unwrap()
    }

    fn features(frames: usize) -> Arc<AlignedFeatures> {
        let mel = Array2::from_shape_fn((80, 200), |(c, t)| (c + t) as f32);
        Arc::new(align(Arc::new(MelFeatureMatrix::from_array(mel)), frames, 16).unwrap())
    }

    fn frames(n: u64) -> Vec<Frame> {
        let image = Arc::new(RgbImage::from_pixel(120, 100, Rgb([10, 20, 30])));
        (0..n)
            .map(|index| Frame {
                index,
                timestamp: index as f64 / 30.0,
                image: image.clone(),
            })
            .collect()
    }

    fn regions(rects: &[FaceRect]) -> Vec<FaceRegion> {
        rects
            .iter()
            .enumerate()
            .map(|(index, rect)| FaceRegion { index, rect: *rect })
            .collect()
    }

    #[test]
    fn test_choose_face() {
        let one = regions(&[rect(10, 60, 60, 10)]);
        let three = regions(&[rect(10, 30, 30, 10), rect(10, 60, 30, 40), rect(10, 90, 30, 70)]);

        assert!(matches!(choose_face(&[], None), Err(FaceError::NoFaceDetected)));
        assert!(matches!(choose_face(&[], Some(0)), Err(FaceError::NoFaceDetected)));
        assert_eq!(choose_face(&one, None).unwrap().unwrap().index, 0);
        assert_eq!(choose_face(&three, None).unwrap(), None);
        assert_eq!(choose_face(&three, Some(2)).unwrap().unwrap().index, 2);
        assert!(matches!(
            choose_face(&three, Some(5)),
            Err(FaceError::FaceIndexOutOfRange { index: 5, count: 3 })
        ));
    }

    #[test]
    fn test_batch_keeps_order_and_edits_only_the_face() {
        let face = rect(20, 80, 90, 30);
        let locator = FaceLocator::new(Arc::new(Fixed(vec![face])));
        let processor = FrameProcessor::new(locator, Arc::new(White), features(6));
        let input = frames(6);

        let mut selector = FaceSelector::positional(0);
        let out = processor.process_batch(&input, &mut selector).unwrap();

        assert_eq!(out.len(), 6);
        for (frame, processed) in input.iter().zip(&out) {
            assert!(processed.is_synced());
            let image = processed.image();
            for (x, y, p) in image.enumerate_pixels() {
                if !face.contains(x, y) {
                    assert_eq!(p, frame.image.get_pixel(x, y));
                }
            }
            assert_eq!(image.get_pixel(55, 55), &Rgb([255, 255, 255]));
        }
    }

    /// Finds a face only on frames whose (0, 0) red channel is even, taking
    /// longer on early frames so parallel detection finishes out of order.
    struct EvenFrames(FaceRect);

    impl FaceDetector for EvenFrames {
        fn detect(&self, image: &RgbImage) -> MediaResult<Vec<FaceRect>> {
            let index = image.get_pixel(0, 0)[0];
            std::thread::sleep(std::time::Duration::from_millis(((20 - index as u64 % 20) % 7) * 2));
            Ok(if index % 2 == 0 { vec![self.0] } else { Vec::new() })
        }

        fn name(&self) -> &'static str {
            "even-frames"
        }
    }

    /// Fills the face with the index of the feature window it was given.
    struct WindowStamp;

    impl LipSyncEngine for WindowStamp {
        fn ensure_loaded(&self) -> Result<(), ModelError> {
            Ok(())
        }

        fn synthesize(
            &self,
            face: &RgbImage,
            window: &AlignedFeatureWindow,
        ) -> Result<RgbImage, ModelError> {
            Ok(RgbImage::from_pixel(face.width(), face.height(), Rgb([window.index as u8, 200, 0])))
        }

        fn name(&self) -> &'static str {
            "window-stamp"
        }
    }

    #[test]
    fn test_parallel_batch_preserves_frame_order() {
        let face = rect(20, 80, 90, 30);
        let locator = FaceLocator::new(Arc::new(EvenFrames(face)));
        let processor = FrameProcessor::new(locator, Arc::new(WindowStamp), features(20));
        let input: Vec<Frame> = (0..20u64)
            .map(|index| {
                let mut image = RgbImage::from_pixel(120, 100, Rgb([10, 20, 30]));
                image.put_pixel(0, 0, Rgb([index as u8, 0, 0]));
                Frame {
                    index,
                    timestamp: index as f64 / 30.0,
                    image: Arc::new(image),
                }
            })
            .collect();

        let mut selector = FaceSelector::positional(0);
        let out = processor.process_batch(&input, &mut selector).unwrap();

        assert_eq!(out.len(), 20);
        for (i, processed) in out.iter().enumerate() {
            let image = processed.image();
            assert_eq!(image.get_pixel(0, 0), &Rgb([i as u8, 0, 0]), "frame {i} moved");
            assert_eq!(processed.is_synced(), i % 2 == 0, "frame {i}");
            if processed.is_synced() {
                assert_eq!(image.get_pixel(55, 55), &Rgb([i as u8, 200, 0]), "window for frame {i}");
            } else {
                assert_eq!(image, input[i].image.as_ref());
            }
        }
    }

    #[test]
    fn test_missing_face_passes_frame_through() {
        let locator = FaceLocator::new(Arc::new(Fixed(vec![rect(0, 40, 40, 0)])));
        let processor = FrameProcessor::new(locator, Arc::new(White), features(3));
        let input = frames(3);

        // index 1 never exists on these frames
        let mut selector = FaceSelector::positional(1);
        let out = processor.process_batch(&input, &mut selector).unwrap();

        assert!(out.iter().all(|f| !f.is_synced()));
        assert_eq!(out[0].image(), input[0].image.as_ref());
    }

    #[test]
    fn test_fixed_regions_skip_detection() {
        // detector finds nothing, the fixed regions are used instead
        let locator = FaceLocator::new(Arc::new(Fixed(Vec::new())));
        let processor = FrameProcessor::new(locator, Arc::new(White), features(2))
            .with_fixed_regions(regions(&[rect(10, 50, 50, 10)]));

        let mut selector = FaceSelector::positional(0);
        let out = processor.process_batch(&frames(2), &mut selector).unwrap();
        assert!(out.iter().all(|f| f.is_synced()));
    }

    #[test]
    fn test_model_error_stops_the_batch() {
        let locator = FaceLocator::new(Arc::new(Fixed(vec![rect(10, 50, 50, 10)])));
        let processor = FrameProcessor::new(locator, Arc::new(Broken), features(2));

        let mut selector = FaceSelector::positional(0);
        let err = processor.process_batch(&frames(2), &mut selector).unwrap_err();
        assert!(matches!(err, MediaError::Model(ModelError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_config_builders() {
        let config = PipelineConfig::default()
            .with_batch_size(0)
            .with_still_fps(-1.0)
            .with_ffmpeg_timeout(Some(60));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.still_fps, STILL_IMAGE_FPS);
        assert_eq!(config.ffmpeg_timeout_secs, Some(60));
        assert!(default_batch_size() >= 2);
    }
}
