//! Background job dispatcher.
//!
//! Polls for uploaded videos every `poll_interval` and runs the pipeline on
//! them, at most `max_concurrent` at a time. Claims go through
//! [`VideoStore::claim_next`] so several worker processes can share one
//! database without double-processing. Each cycle first fails videos whose
//! lease outlived the orchestrator's lease TTL, which is how work held by a
//! crashed worker is released.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use v2t_pipeline::orchestrator::{PipelineOrchestrator, RunRequest};
use v2t_pipeline::store::StoreError;

/// Sampling parameters applied to every dispatched job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobSettings {
    pub interval_secs: f64,
    pub confidence_threshold: f64,
}

pub struct JobDispatcher {
    orchestrator: PipelineOrchestrator,
    settings: JobSettings,
    worker_name: String,
    poll_interval: Duration,
    slots: Arc<Semaphore>,
}

impl JobDispatcher {
    pub fn new(
        orchestrator: PipelineOrchestrator,
        settings: JobSettings,
        worker_name: impl Into<String>,
        max_concurrent: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            settings,
            worker_name: worker_name.into(),
            poll_interval,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run the dispatcher loop until the cancellation token is triggered,
    /// then wait for in-flight jobs to observe it and finish.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut jobs = JoinSet::new();
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_concurrent = self.slots.available_permits(),
            worker = %self.worker_name,
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(in_flight = jobs.len(), "Job dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    reap(&mut jobs);
                    if let Err(e) = self.expire_stale_leases().await {
                        tracing::error!(error = %e, "Lease expiry sweep failed");
                    }
                    if let Err(e) = self.try_dispatch(&mut jobs, &cancel).await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }

        while let Some(result) = jobs.join_next().await {
            log_join(result);
        }
        tracing::info!("Job dispatcher stopped");
    }

    /// Fail every video whose processing lease was not renewed within the
    /// lease TTL. Returns how many were failed.
    pub async fn expire_stale_leases(&self) -> Result<usize, StoreError> {
        let expired = self
            .orchestrator
            .store()
            .expire_leases(self.orchestrator.lease_ttl())
            .await?;
        for video in &expired {
            tracing::warn!(
                video_id = %video.id,
                reason = video.error_message.as_deref().unwrap_or_default(),
                "Expired abandoned processing lease",
            );
        }
        Ok(expired.len())
    }

    /// One dispatch cycle: claim videos while job slots are free.
    ///
    /// Returns the number of jobs started.
    pub async fn try_dispatch(
        &self,
        jobs: &mut JoinSet<()>,
        cancel: &CancellationToken,
    ) -> Result<usize, StoreError> {
        let mut started = 0;
        loop {
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                break;
            };
            let Some((video, lease)) = self.orchestrator.store().claim_next(&self.worker_name).await?
            else {
                break;
            };

            tracing::info!(video_id = %video.id, filename = %video.filename, "Video claimed");
            let request = RunRequest {
                video_id: video.id,
                source_path: video.storage_path,
                interval_secs: self.settings.interval_secs,
                confidence_threshold: self.settings.confidence_threshold,
            };
            let orchestrator = self.orchestrator.clone();
            let job_cancel = cancel.child_token();
            jobs.spawn(async move {
                let _permit = permit;
                let id = request.video_id;
                if let Err(e) = orchestrator.run_with_lease(request, lease, &job_cancel).await {
                    tracing::error!(video_id = %id, error = %e, "Job could not record its outcome");
                }
            });
            started += 1;
        }
        Ok(started)
    }
}

fn reap(jobs: &mut JoinSet<()>) {
    while let Some(result) = jobs.try_join_next() {
        log_join(result);
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Job task panicked");
    }
}
