//! Persistence seam used by the orchestrator and the worker service.
//!
//! [`VideoStore`] owns the lifecycle rules that need atomicity: taking the
//! processing lease together with `uploaded -> processing`, and committing
//! metadata, result rows and `completed` as one unit. Leases carry a
//! heartbeat: the holder renews them, and leases left unrenewed past a TTL
//! are expired to `failed`.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use v2t_core::aggregation::AggregatedResults;
use v2t_core::detection::{DetectedObject, ExtractedText};
use v2t_core::error::CoreError;
use v2t_core::status::VideoStatus;
use v2t_core::types::{Timestamp, VideoId};
use v2t_core::video::{NewVideo, Video};
use v2t_db::models::video::{CompletedMetadata, VideoListQuery, VideoRow};
use v2t_db::repositories::{DetectedObjectRepo, ExtractedTextRepo, VideoRepo};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Exclusive right to process one video, held from `processing` until a
/// terminal transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub token: Uuid,
    pub holder: String,
    pub acquired_at: Timestamp,
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn create_video(&self, input: NewVideo) -> Result<Video, StoreError>;

    async fn find_video(&self, id: VideoId) -> Result<Option<Video>, StoreError>;

    async fn list_videos(&self, query: &VideoListQuery) -> Result<Vec<Video>, StoreError>;

    /// Lease the oldest unleased `uploaded` video, moving it to
    /// `processing`. `None` when nothing is waiting.
    async fn claim_next(&self, worker: &str) -> Result<Option<(Video, Lease)>, StoreError>;

    /// Atomically move `uploaded -> processing` and take the lease.
    ///
    /// `NotFound` for unknown ids, `Conflict` when the video is leased or
    /// not `uploaded`.
    async fn begin_processing(&self, id: VideoId, worker: &str) -> Result<(Video, Lease), StoreError>;

    /// Commit metadata, every result row and `completed`, then release the
    /// lease. Nothing is written unless all of it is.
    async fn complete_processing(
        &self,
        id: VideoId,
        lease: &Lease,
        metadata: CompletedMetadata,
        results: &AggregatedResults,
    ) -> Result<(), StoreError>;

    /// Record `failed` with a message and release the lease.
    async fn fail_processing(&self, id: VideoId, lease: &Lease, message: &str) -> Result<(), StoreError>;

    /// Refresh the lease heartbeat. `Conflict` when it is no longer held.
    async fn renew_lease(&self, id: VideoId, lease: &Lease) -> Result<(), StoreError>;

    /// Move every `processing` video whose lease was not taken or renewed
    /// within `ttl` to `failed`, releasing the lease. Returns those videos.
    async fn expire_leases(&self, ttl: Duration) -> Result<Vec<Video>, StoreError>;

    async fn detected_objects(&self, id: VideoId) -> Result<Vec<DetectedObject>, StoreError>;

    async fn extracted_texts(&self, id: VideoId) -> Result<Vec<ExtractedText>, StoreError>;

    /// Remove a video and its results. `Conflict` while it is processing.
    async fn delete_video(&self, id: VideoId) -> Result<Video, StoreError>;
}

/// Error for a `begin_processing` call that found the video unavailable.
pub(crate) fn begin_conflict(video: &Video, holder: Option<&str>) -> CoreError {
    match (video.status, holder) {
        (VideoStatus::Processing, Some(holder)) => CoreError::Conflict(format!(
            "Video {} is already being processed by {holder}",
            video.id
        )),
        (status, _) => CoreError::Conflict(format!(
            "Video {} cannot start processing from status {status}",
            video.id
        )),
    }
}

pub(crate) fn lease_lost(id: VideoId) -> CoreError {
    CoreError::Conflict(format!("Processing lease for video {id} is no longer held"))
}

pub(crate) fn lease_expired_message(holder: &str) -> String {
    format!("Processing lease expired (worker {holder})")
}

pub(crate) fn delete_conflict(id: VideoId) -> CoreError {
    CoreError::Conflict(format!(
        "Video {id} is being processed and cannot be deleted"
    ))
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// [`VideoStore`] over the `v2t-db` repositories.
#[derive(Clone)]
pub struct PgVideoStore {
    pool: PgPool,
}

impl PgVideoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_video(row: VideoRow) -> Result<Video, StoreError> {
    Ok(Video::try_from(row)?)
}

fn lease_from_row(row: &VideoRow, token: Uuid, worker: &str) -> Lease {
    Lease {
        token,
        holder: worker.to_string(),
        acquired_at: row.leased_at.unwrap_or_else(chrono::Utc::now),
    }
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn create_video(&self, input: NewVideo) -> Result<Video, StoreError> {
        to_video(VideoRepo::create(&self.pool, &input).await?)
    }

    async fn find_video(&self, id: VideoId) -> Result<Option<Video>, StoreError> {
        VideoRepo::find_by_id(&self.pool, id)
            .await?
            .map(to_video)
            .transpose()
    }

    async fn list_videos(&self, query: &VideoListQuery) -> Result<Vec<Video>, StoreError> {
        VideoRepo::list(&self.pool, query)
            .await?
            .into_iter()
            .map(to_video)
            .collect()
    }

    async fn claim_next(&self, worker: &str) -> Result<Option<(Video, Lease)>, StoreError> {
        let token = Uuid::new_v4();
        match VideoRepo::claim_next(&self.pool, token, worker).await? {
            Some(row) => {
                let lease = lease_from_row(&row, token, worker);
                Ok(Some((to_video(row)?, lease)))
            }
            None => Ok(None),
        }
    }

    async fn begin_processing(&self, id: VideoId, worker: &str) -> Result<(Video, Lease), StoreError> {
        let token = Uuid::new_v4();
        if let Some(row) = VideoRepo::begin_processing(&self.pool, id, token, worker).await? {
            let lease = lease_from_row(&row, token, worker);
            return Ok((to_video(row)?, lease));
        }

        let row = VideoRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| CoreError::video_not_found(id))?;
        let holder = row.leased_by.clone();
        let video = to_video(row)?;
        Err(begin_conflict(&video, holder.as_deref()).into())
    }

    async fn complete_processing(
        &self,
        id: VideoId,
        lease: &Lease,
        metadata: CompletedMetadata,
        results: &AggregatedResults,
    ) -> Result<(), StoreError> {
        let committed = VideoRepo::complete_with_results(
            &self.pool,
            id,
            lease.token,
            metadata,
            &results.detected_objects,
            &results.extracted_texts,
        )
        .await?;
        if committed {
            Ok(())
        } else {
            Err(lease_lost(id).into())
        }
    }

    async fn fail_processing(&self, id: VideoId, lease: &Lease, message: &str) -> Result<(), StoreError> {
        if VideoRepo::fail(&self.pool, id, lease.token, message).await? {
            Ok(())
        } else {
            Err(lease_lost(id).into())
        }
    }

    async fn renew_lease(&self, id: VideoId, lease: &Lease) -> Result<(), StoreError> {
        if VideoRepo::renew_lease(&self.pool, id, lease.token).await? {
            Ok(())
        } else {
            Err(lease_lost(id).into())
        }
    }

    async fn expire_leases(&self, ttl: Duration) -> Result<Vec<Video>, StoreError> {
        VideoRepo::expire_leases(&self.pool, ttl.as_secs_f64())
            .await?
            .into_iter()
            .map(to_video)
            .collect()
    }

    async fn detected_objects(&self, id: VideoId) -> Result<Vec<DetectedObject>, StoreError> {
        let rows = DetectedObjectRepo::list_by_video(&self.pool, id).await?;
        Ok(rows.into_iter().map(DetectedObject::from).collect())
    }

    async fn extracted_texts(&self, id: VideoId) -> Result<Vec<ExtractedText>, StoreError> {
        let rows = ExtractedTextRepo::list_by_video(&self.pool, id).await?;
        Ok(rows.into_iter().map(ExtractedText::from).collect())
    }

    async fn delete_video(&self, id: VideoId) -> Result<Video, StoreError> {
        if let Some(row) = VideoRepo::delete(&self.pool, id).await? {
            return to_video(row);
        }
        match VideoRepo::find_by_id(&self.pool, id).await? {
            None => Err(CoreError::video_not_found(id).into()),
            Some(_) => Err(delete_conflict(id).into()),
        }
    }
}
