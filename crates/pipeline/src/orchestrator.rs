//! Drives one video from `uploaded` to a terminal status.
//!
//! Checkpoints, in order:
//!
//! 1. load the video record (missing record aborts without a status change)
//! 2. take the lease and move to `processing`
//! 3. probe metadata (failure is logged, fields stay empty)
//! 4. sample frames
//! 5. run detection and recognition on every frame; a failing, panicking or
//!    timed-out call only empties that frame's results
//! 6. aggregate
//! 7. commit metadata, records and `completed` in one transaction
//!
//! Any error after step 2 marks the video `failed` with the error text. The
//! uploaded source file is never touched. Cancellation is observed at every
//! capability call and before the commit, and counts as a failure.
//!
//! While an attempt runs, its lease is renewed every third of the lease TTL.
//! Renewal stops as soon as the attempt ends or its future is dropped.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use v2t_core::aggregation::ResultAggregator;
use v2t_core::detection::{merge_spans, Detection, FrameText};
use v2t_core::error::CoreError;
use v2t_core::sampling::{FrameDescriptor, SamplingPlan};
use v2t_core::status::VideoStatus;
use v2t_core::storage::StorageLayout;
use v2t_core::types::VideoId;
use v2t_core::video::VideoMetadata;
use v2t_db::models::video::CompletedMetadata;

use crate::capability::{CapabilityError, DetectionCapability, RecognitionCapability};
use crate::decoder::{DecodeError, VideoDecoder};
use crate::store::{Lease, StoreError, VideoStore};

/// Default per-call timeout for capability invocations.
pub const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time a lease survives without renewal.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Frame sampling failed: {0}")]
    Sampling(String),

    #[error("Frame extraction failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Processing was cancelled")]
    Cancelled,
}

/// Parameters of one processing attempt.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub video_id: VideoId,
    pub source_path: PathBuf,
    pub interval_secs: f64,
    pub confidence_threshold: f64,
}

/// What a finished attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub video_id: VideoId,
    /// `Completed` or `Failed`.
    pub status: VideoStatus,
    pub frames_processed: usize,
    /// Frames where at least one capability call failed.
    pub degraded_frames: usize,
    pub detections: usize,
    pub text_entries: usize,
    pub metadata: Option<VideoMetadata>,
    pub error_message: Option<String>,
}

impl RunOutcome {
    fn failed(video_id: VideoId, message: String) -> Self {
        Self {
            video_id,
            status: VideoStatus::Failed,
            frames_processed: 0,
            degraded_frames: 0,
            detections: 0,
            text_entries: 0,
            metadata: None,
            error_message: Some(message),
        }
    }
}

// ---------------------------------------------------------------------------
// Job tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Leased,
    Probing,
    Sampling,
    Analyzing,
    Aggregating,
    Persisting,
    Finished,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Checkpoint::Leased => "leased",
            Checkpoint::Probing => "probing",
            Checkpoint::Sampling => "sampling",
            Checkpoint::Analyzing => "analyzing",
            Checkpoint::Aggregating => "aggregating",
            Checkpoint::Persisting => "persisting",
            Checkpoint::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Ephemeral tracker for one processing attempt. Only its final status and
/// error message outlive the run.
#[derive(Debug)]
pub struct ProcessingJob {
    pub video_id: VideoId,
    pub worker: String,
    pub lease: Lease,
    pub checkpoint: Checkpoint,
    started: Instant,
}

impl ProcessingJob {
    fn new(video_id: VideoId, worker: &str, lease: Lease) -> Self {
        Self {
            video_id,
            worker: worker.to_string(),
            lease,
            checkpoint: Checkpoint::Leased,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, checkpoint: Checkpoint) {
        self.checkpoint = checkpoint;
        tracing::debug!(
            video_id = %self.video_id,
            worker = %self.worker,
            checkpoint = %checkpoint,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Pipeline checkpoint",
        );
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Shared, read-only collaborators for every processing attempt.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    store: Arc<dyn VideoStore>,
    decoder: Arc<dyn VideoDecoder>,
    detector: Arc<dyn DetectionCapability>,
    recognizer: Arc<dyn RecognitionCapability>,
    layout: StorageLayout,
    worker_name: String,
    capability_timeout: Duration,
    lease_ttl: Duration,
}

struct FrameAnalysis {
    detections: Vec<Detection>,
    text: Option<FrameText>,
    degraded: bool,
}

struct Processed {
    metadata: Option<VideoMetadata>,
    frames_processed: usize,
    degraded_frames: usize,
    detections: usize,
    text_entries: usize,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn VideoStore>,
        decoder: Arc<dyn VideoDecoder>,
        detector: Arc<dyn DetectionCapability>,
        recognizer: Arc<dyn RecognitionCapability>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            store,
            decoder,
            detector,
            recognizer,
            layout,
            worker_name: "local".to_string(),
            capability_timeout: DEFAULT_CAPABILITY_TIMEOUT,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout;
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn VideoStore> {
        &self.store
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Process one video to a terminal status.
    ///
    /// Returns `Err` only when the attempt never started (unknown video,
    /// lease held, not `uploaded`) or when the terminal status could not be
    /// recorded. A processing failure is an `Ok` outcome with `Failed`.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let id = request.video_id;
        self.store
            .find_video(id)
            .await?
            .ok_or_else(|| StoreError::from(CoreError::video_not_found(id)))?;

        let (_, lease) = self.store.begin_processing(id, &self.worker_name).await?;
        self.run_with_lease(request, lease, cancel).await
    }

    /// Continue an attempt whose lease was already taken, e.g. through
    /// [`VideoStore::claim_next`].
    pub async fn run_with_lease(
        &self,
        request: RunRequest,
        lease: Lease,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let id = request.video_id;
        let mut job = ProcessingJob::new(id, &self.worker_name, lease.clone());
        job.advance(Checkpoint::Leased);
        tracing::info!(video_id = %id, worker = %self.worker_name, "Video processing started");

        let stop_renewal = CancellationToken::new();
        let _renewal_guard = stop_renewal.clone().drop_guard();
        tokio::spawn(renew_lease(
            Arc::clone(&self.store),
            id,
            lease.clone(),
            (self.lease_ttl / 3).max(Duration::from_millis(1)),
            stop_renewal,
        ));

        match self.process(&mut job, &request, &lease, cancel).await {
            Ok(done) => {
                job.advance(Checkpoint::Finished);
                tracing::info!(
                    video_id = %id,
                    frames = done.frames_processed,
                    degraded_frames = done.degraded_frames,
                    detections = done.detections,
                    text_entries = done.text_entries,
                    "Video processing completed",
                );
                Ok(RunOutcome {
                    video_id: id,
                    status: VideoStatus::Completed,
                    frames_processed: done.frames_processed,
                    degraded_frames: done.degraded_frames,
                    detections: done.detections,
                    text_entries: done.text_entries,
                    metadata: done.metadata,
                    error_message: None,
                })
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(
                    video_id = %id,
                    checkpoint = %job.checkpoint,
                    error = %message,
                    "Video processing failed",
                );
                self.store.fail_processing(id, &lease, &message).await?;
                job.advance(Checkpoint::Finished);
                Ok(RunOutcome::failed(id, message))
            }
        }
    }

    async fn process(
        &self,
        job: &mut ProcessingJob,
        request: &RunRequest,
        lease: &Lease,
        cancel: &CancellationToken,
    ) -> Result<Processed, PipelineError> {
        let id = request.video_id;

        job.advance(Checkpoint::Probing);
        let probed = self.decoder.probe(&request.source_path).await;
        if let Err(e) = &probed {
            tracing::warn!(video_id = %id, error = %e, "Metadata extraction failed");
        }
        let metadata = probed.as_ref().ok().copied();

        job.advance(Checkpoint::Sampling);
        let plan = match &probed {
            Ok(meta) => SamplingPlan::new(meta.fps, request.interval_secs)
                .map_err(|e| PipelineError::Sampling(e.to_string()))?,
            Err(e) => {
                return Err(PipelineError::Sampling(format!(
                    "frame rate unknown, metadata extraction failed: {e}"
                )))
            }
        };
        let frames_dir = self.layout.frames_dir_for(id);
        let frames = self
            .decoder
            .sample(&request.source_path, &plan, &frames_dir)
            .await?;
        tracing::info!(
            video_id = %id,
            frames = frames.len(),
            frame_step = plan.frame_step(),
            "Frames sampled",
        );

        job.advance(Checkpoint::Analyzing);
        let mut aggregator = ResultAggregator::new(id);
        let mut degraded_frames = 0;
        for frame in frames {
            let analysis = self
                .analyze_frame(&frame, request.confidence_threshold, cancel)
                .await?;
            if analysis.degraded {
                degraded_frames += 1;
            }
            aggregator.record_frame(&frame, analysis.detections, analysis.text);
        }

        job.advance(Checkpoint::Aggregating);
        let results = aggregator.finish();

        job.advance(Checkpoint::Persisting);
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let persisted = CompletedMetadata {
            duration_secs: metadata.map(|m| m.duration_secs),
            fps: metadata.map(|m| m.fps),
        };
        self.store
            .complete_processing(id, lease, persisted, &results)
            .await?;

        Ok(Processed {
            metadata,
            frames_processed: results.frames_processed,
            degraded_frames,
            detections: results.detected_objects.len(),
            text_entries: results.extracted_texts.len(),
        })
    }

    /// Run both capabilities on one frame. They are independent: one failing
    /// does not discard the other's output.
    async fn analyze_frame(
        &self,
        frame: &FrameDescriptor,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> Result<FrameAnalysis, PipelineError> {
        let detector = Arc::clone(&self.detector);
        let detect_frame = frame.clone();
        let detect = self.call_capability(
            detector.name().to_string(),
            frame.sequence_index,
            cancel,
            move || detector.detect(&detect_frame, threshold),
        );

        let recognizer = Arc::clone(&self.recognizer);
        let recognize_frame = frame.clone();
        let recognize = self.call_capability(
            recognizer.name().to_string(),
            frame.sequence_index,
            cancel,
            move || recognizer.recognize(&recognize_frame),
        );

        let (detections, spans) = tokio::join!(detect, recognize);
        let (detections, spans) = (detections?, spans?);
        let degraded = detections.is_none() || spans.is_none();

        Ok(FrameAnalysis {
            detections: accept_detections(detections.unwrap_or_default(), threshold, frame.dimensions),
            text: spans.and_then(|s| merge_spans(&s)),
            degraded,
        })
    }

    /// Run a blocking capability call with the per-call timeout.
    ///
    /// `Ok(None)` means the call failed for this frame only; `Err` is
    /// returned solely for cancellation.
    async fn call_capability<T, F>(
        &self,
        capability: String,
        frame: i32,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<Option<T>, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, CapabilityError> + Send + 'static,
    {
        let timeout = self.capability_timeout;
        let task = tokio::task::spawn_blocking(call);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            outcome = tokio::time::timeout(timeout, task) => outcome,
        };
        match outcome {
            Ok(Ok(Ok(value))) => Ok(Some(value)),
            Ok(Ok(Err(e))) => {
                tracing::warn!(frame, capability = %capability, error = %e, "Capability failed on frame");
                Ok(None)
            }
            Ok(Err(e)) => {
                tracing::warn!(frame, capability = %capability, error = %e, "Capability panicked on frame");
                Ok(None)
            }
            Err(_) => {
                // Command-backed capabilities kill their own process at the same
                // deadline. Any other call finishes detached and is dropped.
                tracing::warn!(
                    frame,
                    capability = %capability,
                    timeout_secs = timeout.as_secs(),
                    "Capability timed out on frame",
                );
                Ok(None)
            }
        }
    }
}

/// Renew `lease` every `every` until `stop` fires or the lease is lost.
async fn renew_lease(
    store: Arc<dyn VideoStore>,
    id: VideoId,
    lease: Lease,
    every: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                match store.renew_lease(id, &lease).await {
                    Ok(()) => tracing::trace!(video_id = %id, "Lease renewed"),
                    Err(StoreError::Core(CoreError::Conflict(_))) => {
                        tracing::warn!(video_id = %id, holder = %lease.holder, "Lease lost, renewal stopped");
                        break;
                    }
                    Err(e) => tracing::warn!(video_id = %id, error = %e, "Lease renewal failed"),
                }
            }
        }
    }
}

/// Keep detections that are valid, meet `threshold`, and still have area
/// after clamping to the frame when its size is known.
pub fn accept_detections(
    raw: Vec<Detection>,
    threshold: f64,
    dimensions: Option<(u32, u32)>,
) -> Vec<Detection> {
    raw.into_iter()
        .filter(|d| d.confidence >= threshold && d.validate().is_ok())
        .filter_map(|mut d| {
            if let Some((w, h)) = dimensions {
                d.bbox = d.bbox.clamp_to(w, h)?;
            }
            Some(d)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use v2t_core::detection::BoundingBox;

    use super::*;

    fn det(class: &str, confidence: f64, bbox: (f64, f64, f64, f64)) -> Detection {
        Detection {
            class_label: class.into(),
            confidence,
            bbox: BoundingBox {
                x1: bbox.0,
                y1: bbox.1,
                x2: bbox.2,
                y2: bbox.3,
            },
        }
    }

    #[test]
    fn below_threshold_and_invalid_are_dropped() {
        let kept = accept_detections(
            vec![
                det("person", 0.9, (0.0, 0.0, 10.0, 10.0)),
                det("cat", 0.3, (0.0, 0.0, 10.0, 10.0)),
                det("dog", 1.4, (0.0, 0.0, 10.0, 10.0)),
                det("", 0.8, (0.0, 0.0, 10.0, 10.0)),
                det("cup", 0.8, (10.0, 0.0, 5.0, 10.0)),
            ],
            0.5,
            None,
        );
        let classes: Vec<&str> = kept.iter().map(|d| d.class_label.as_str()).collect();
        assert_eq!(classes, vec!["person"]);
    }

    #[test]
    fn boxes_are_clamped_to_the_frame() {
        let kept = accept_detections(
            vec![
                det("bus", 0.8, (-5.0, 10.0, 700.0, 500.0)),
                det("ghost", 0.8, (700.0, 10.0, 800.0, 20.0)),
            ],
            0.5,
            Some((640, 480)),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bbox, BoundingBox { x1: 0.0, y1: 10.0, x2: 640.0, y2: 480.0 });
    }

    #[test]
    fn checkpoints_display_lowercase() {
        assert_eq!(Checkpoint::Persisting.to_string(), "persisting");
    }
}
