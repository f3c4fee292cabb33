#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use v2t_core::detection::{BoundingBox, ConfidenceScale, Detection, RecognitionSpan};
use v2t_core::sampling::{FrameDescriptor, SampledFrames, SamplingPlan};
use v2t_core::storage::StorageLayout;
use v2t_core::types::VideoId;
use v2t_core::video::VideoMetadata;
use v2t_pipeline::capability::{CapabilityError, DetectionCapability, RecognitionCapability};
use v2t_pipeline::decoder::{DecodeError, VideoDecoder};
use v2t_pipeline::memory::MemoryStore;
use v2t_pipeline::orchestrator::{PipelineOrchestrator, RunRequest};
use v2t_worker::service::VideoService;

/// A 10 fps, 3 second clip whose frames carry one person and one sign.
pub struct StillCamera;

#[async_trait]
impl VideoDecoder for StillCamera {
    async fn probe(&self, _source: &Path) -> Result<VideoMetadata, DecodeError> {
        Ok(VideoMetadata {
            duration_secs: 3.0,
            fps: 10.0,
            width: 320,
            height: 240,
            total_frames: 30,
        })
    }

    async fn sample(
        &self,
        _source: &Path,
        plan: &SamplingPlan,
        frames_dir: &Path,
    ) -> Result<SampledFrames, DecodeError> {
        tokio::fs::create_dir_all(frames_dir)
            .await
            .map_err(|e| DecodeError::Inspect(e.to_string()))?;
        Ok(plan.positions(30))
    }
}

pub struct OnePerson;

impl DetectionCapability for OnePerson {
    fn name(&self) -> &str {
        "one-person"
    }

    fn detect(&self, _frame: &FrameDescriptor, _threshold: f64) -> Result<Vec<Detection>, CapabilityError> {
        Ok(vec![Detection {
            class_label: "person".into(),
            confidence: 0.92,
            bbox: BoundingBox::new(10.0, 10.0, 100.0, 200.0).expect("valid box"),
        }])
    }
}

pub struct StreetSign;

impl RecognitionCapability for StreetSign {
    fn name(&self) -> &str {
        "street-sign"
    }

    fn recognize(&self, _frame: &FrameDescriptor) -> Result<Vec<RecognitionSpan>, CapabilityError> {
        Ok(vec![
            RecognitionSpan {
                text: "Main".into(),
                confidence: 88.0,
                scale: ConfidenceScale::Percent,
            },
            RecognitionSpan {
                text: "St".into(),
                confidence: 84.0,
                scale: ConfidenceScale::Percent,
            },
        ])
    }
}

pub struct Env {
    pub store: Arc<MemoryStore>,
    pub service: VideoService,
    pub orchestrator: PipelineOrchestrator,
    pub layout: StorageLayout,
    pub root: tempfile::TempDir,
}

impl Env {
    pub async fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let layout = StorageLayout::under(root.path());
        layout.ensure_dirs().await.expect("storage dirs");
        let store = Arc::new(MemoryStore::new());
        let service = VideoService::new(store.clone(), layout.clone());
        let orchestrator = PipelineOrchestrator::new(
            store.clone(),
            Arc::new(StillCamera),
            Arc::new(OnePerson),
            Arc::new(StreetSign),
            layout.clone(),
        )
        .with_worker_name("test-worker")
        .with_capability_timeout(Duration::from_secs(5));
        Self {
            store,
            service,
            orchestrator,
            layout,
            root,
        }
    }

    /// Write a small file outside the storage area to upload from.
    pub async fn source_file(&self, name: &str) -> PathBuf {
        let path = self.root.path().join(name);
        tokio::fs::write(&path, b"not really a video").await.expect("write source");
        path
    }

    pub async fn process(&self, id: VideoId, source_path: PathBuf) {
        let request = RunRequest {
            video_id: id,
            source_path,
            interval_secs: 1.0,
            confidence_threshold: 0.5,
        };
        self.orchestrator
            .run(request, &CancellationToken::new())
            .await
            .expect("run");
    }

    pub async fn exported_files(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.layout.exports_dir).await.expect("read exports");
        while let Some(entry) = dir.next_entry().await.expect("entry") {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }
}
