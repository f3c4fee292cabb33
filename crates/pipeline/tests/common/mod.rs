#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use v2t_core::detection::{BoundingBox, ConfidenceScale, Detection, RecognitionSpan};
use v2t_core::ffmpeg::FfmpegError;
use v2t_core::sampling::{FrameDescriptor, SampledFrames, SamplingPlan};
use v2t_core::storage::StorageLayout;
use v2t_core::types::new_video_id;
use v2t_core::video::{NewVideo, Video, VideoMetadata};
use v2t_pipeline::capability::{
    CapabilityError, CommandDetector, DetectionCapability, RecognitionCapability,
};
use v2t_pipeline::decoder::{DecodeError, VideoDecoder};
use v2t_pipeline::memory::MemoryStore;
use v2t_pipeline::orchestrator::{PipelineOrchestrator, RunRequest};
use v2t_pipeline::store::VideoStore;

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decoder that reports fixed metadata and samples without touching disk.
pub struct FakeDecoder {
    pub metadata: Option<VideoMetadata>,
}

impl FakeDecoder {
    /// A 10 fps, 5 second clip: 50 frames.
    pub fn ten_fps_five_seconds() -> Self {
        Self {
            metadata: Some(VideoMetadata {
                duration_secs: 5.0,
                fps: 10.0,
                width: 640,
                height: 480,
                total_frames: 50,
            }),
        }
    }

    pub fn empty_clip() -> Self {
        Self {
            metadata: Some(VideoMetadata {
                duration_secs: 0.0,
                fps: 25.0,
                width: 640,
                height: 480,
                total_frames: 0,
            }),
        }
    }

    pub fn unprobeable() -> Self {
        Self { metadata: None }
    }
}

#[async_trait]
impl VideoDecoder for FakeDecoder {
    async fn probe(&self, source: &Path) -> Result<VideoMetadata, DecodeError> {
        self.metadata.ok_or_else(|| {
            DecodeError::Ffmpeg(FfmpegError::VideoNotFound(source.display().to_string()))
        })
    }

    async fn sample(
        &self,
        _source: &Path,
        plan: &SamplingPlan,
        frames_dir: &Path,
    ) -> Result<SampledFrames, DecodeError> {
        let meta = self.metadata.unwrap_or(VideoMetadata {
            duration_secs: 0.0,
            fps: plan.source_fps(),
            width: 0,
            height: 0,
            total_frames: 0,
        });
        let frames: Vec<FrameDescriptor> = plan
            .positions(meta.total_frames)
            .map(|mut f| {
                f.dimensions = Some((meta.width, meta.height));
                f.image_path = Some(frames_dir.join(format!("frame_{:06}.jpg", f.position)));
                f
            })
            .collect();
        Ok(SampledFrames::new(frames))
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

type DetectFn = dyn Fn(&FrameDescriptor, f64) -> Result<Vec<Detection>, CapabilityError> + Send + Sync;
type RecognizeFn = dyn Fn(&FrameDescriptor) -> Result<Vec<RecognitionSpan>, CapabilityError> + Send + Sync;

pub struct FnDetector(pub Box<DetectFn>);

impl DetectionCapability for FnDetector {
    fn name(&self) -> &str {
        "fake-detector"
    }

    fn detect(&self, frame: &FrameDescriptor, threshold: f64) -> Result<Vec<Detection>, CapabilityError> {
        (self.0)(frame, threshold)
    }
}

pub struct FnRecognizer(pub Box<RecognizeFn>);

impl RecognitionCapability for FnRecognizer {
    fn name(&self) -> &str {
        "fake-ocr"
    }

    fn recognize(&self, frame: &FrameDescriptor) -> Result<Vec<RecognitionSpan>, CapabilityError> {
        (self.0)(frame)
    }
}

pub fn detection(class: &str, confidence: f64) -> Detection {
    Detection {
        class_label: class.to_string(),
        confidence,
        bbox: BoundingBox::new(10.0, 20.0, 110.0, 220.0).unwrap(),
    }
}

pub fn span(text: &str, percent: f64) -> RecognitionSpan {
    RecognitionSpan {
        text: text.to_string(),
        confidence: percent,
        scale: ConfidenceScale::Percent,
    }
}

pub fn failure(message: &str) -> CapabilityError {
    CapabilityError::Failed {
        program: "fake".to_string(),
        exit_code: Some(1),
        stderr: message.to_string(),
    }
}

pub fn no_detections() -> FnDetector {
    FnDetector(Box::new(|_, _| Ok(Vec::new())))
}

pub fn no_text() -> FnRecognizer {
    FnRecognizer(Box::new(|_| Ok(Vec::new())))
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub orchestrator: PipelineOrchestrator,
    pub video: Video,
    _root: tempfile::TempDir,
}

impl Harness {
    pub async fn new(
        decoder: FakeDecoder,
        detector: impl DetectionCapability + 'static,
        recognizer: impl RecognitionCapability + 'static,
    ) -> Self {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let id = new_video_id();
        let video = store
            .create_video(NewVideo {
                id,
                filename: "street.mp4".into(),
                storage_path: root.path().join(format!("{id}.mp4")),
                size_bytes: 4096,
            })
            .await
            .unwrap();

        let orchestrator = PipelineOrchestrator::new(
            store.clone(),
            Arc::new(decoder),
            Arc::new(detector),
            Arc::new(recognizer),
            StorageLayout::under(root.path()),
        )
        .with_worker_name("test-worker")
        .with_capability_timeout(Duration::from_millis(200));

        Self {
            store,
            orchestrator,
            video,
            _root: root,
        }
    }

    pub fn request(&self) -> RunRequest {
        RunRequest {
            video_id: self.video.id,
            source_path: self.source_path(),
            interval_secs: 1.0,
            confidence_threshold: 0.5,
        }
    }

    pub fn source_path(&self) -> PathBuf {
        self.video.storage_path.clone()
    }

    pub async fn reload(&self) -> Video {
        self.store.find_video(self.video.id).await.unwrap().unwrap()
    }
}

// ---------------------------------------------------------------------------
// External processes
// ---------------------------------------------------------------------------

/// A detector script that appends its pid to `pids` and then hangs.
#[cfg(unix)]
pub fn hung_detector(dir: &Path, pids: &Path, timeout: Duration) -> CommandDetector {
    let script = dir.join("hung-detector.sh");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho $$ >> {}\nexec sleep 30\n", pids.display()),
    )
    .unwrap();
    CommandDetector::from_command_line(&format!("sh {}", script.display()))
        .unwrap()
        .with_timeout(timeout)
}

#[cfg(unix)]
pub fn process_alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid])
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
