//! Repository for the `videos` table.
//!
//! Status changes go through conditional `UPDATE`s so the lifecycle
//! `uploaded -> processing -> {completed, failed}` is enforced by the
//! database even with several workers polling the same table. A processing
//! lease (`lease_token`, `leased_by`, `leased_at`) is taken atomically with
//! the move to `processing` and cleared on either terminal transition. The
//! holder renews `leased_at` while it works; a lease left unrenewed past its
//! TTL is expired to `failed` so a crashed worker never strands a video.

use sqlx::PgPool;
use uuid::Uuid;
use v2t_core::detection::{DetectedObject, ExtractedText};
use v2t_core::status::VideoStatus;
use v2t_core::types::VideoId;
use v2t_core::video::NewVideo;

use super::{DetectedObjectRepo, ExtractedTextRepo};
use crate::models::video::{CompletedMetadata, VideoListQuery, VideoRow};

/// Column list for `videos` queries.
const COLUMNS: &str = "\
    id, filename, storage_path, size_bytes, duration_secs, fps, \
    status_id, error_message, lease_token, leased_by, leased_at, \
    created_at, completed_at, updated_at";

/// Maximum page size for video listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for video listing.
pub const DEFAULT_LIMIT: i64 = 50;

pub struct VideoRepo;

impl VideoRepo {
    /// Insert a freshly uploaded video in the `uploaded` state.
    pub async fn create(pool: &PgPool, input: &NewVideo) -> Result<VideoRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO videos (id, filename, storage_path, size_bytes, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoRow>(&query)
            .bind(input.id)
            .bind(&input.filename)
            .bind(input.storage_path.to_string_lossy().as_ref())
            .bind(input.size_bytes)
            .bind(VideoStatus::Uploaded.id())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: VideoId) -> Result<Option<VideoRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM videos WHERE id = $1");
        sqlx::query_as::<_, VideoRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List videos newest first, optionally filtered by status.
    pub async fn list(pool: &PgPool, params: &VideoListQuery) -> Result<Vec<VideoRow>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let mut bind_idx: u32 = 1;
        let where_clause = if params.status.is_some() {
            bind_idx += 1;
            "WHERE status_id = $1"
        } else {
            ""
        };

        let query = format!(
            "SELECT {COLUMNS} FROM videos \
             {where_clause} \
             ORDER BY created_at DESC, id \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, VideoRow>(&query);
        if let Some(status) = params.status {
            q = q.bind(status.id());
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Claim the oldest unleased `uploaded` video for `worker`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent dispatchers never
    /// claim the same video.
    pub async fn claim_next(
        pool: &PgPool,
        lease_token: Uuid,
        worker: &str,
    ) -> Result<Option<VideoRow>, sqlx::Error> {
        let query = format!(
            "UPDATE videos \
             SET status_id = $1, lease_token = $2, leased_by = $3, leased_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM videos \
                 WHERE status_id = $4 AND lease_token IS NULL \
                 ORDER BY created_at ASC, id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoRow>(&query)
            .bind(VideoStatus::Processing.id())
            .bind(lease_token)
            .bind(worker)
            .bind(VideoStatus::Uploaded.id())
            .fetch_optional(pool)
            .await
    }

    /// Move `uploaded -> processing` and take the lease in one statement.
    ///
    /// Returns `None` when the video is missing, not `uploaded`, or already
    /// leased; the caller inspects the row to tell those apart.
    pub async fn begin_processing(
        pool: &PgPool,
        id: VideoId,
        lease_token: Uuid,
        worker: &str,
    ) -> Result<Option<VideoRow>, sqlx::Error> {
        let query = format!(
            "UPDATE videos \
             SET status_id = $2, lease_token = $3, leased_by = $4, leased_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = $5 AND lease_token IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoRow>(&query)
            .bind(id)
            .bind(VideoStatus::Processing.id())
            .bind(lease_token)
            .bind(worker)
            .bind(VideoStatus::Uploaded.id())
            .fetch_optional(pool)
            .await
    }

    /// Persist metadata and every result row, then mark the video
    /// `completed` and release the lease, all in one transaction.
    ///
    /// Returns `false` (and writes nothing) when the caller no longer holds
    /// the lease.
    pub async fn complete_with_results(
        pool: &PgPool,
        id: VideoId,
        lease_token: Uuid,
        metadata: CompletedMetadata,
        objects: &[DetectedObject],
        texts: &[ExtractedText],
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE videos \
             SET status_id = $3, duration_secs = $4, fps = $5, completed_at = NOW(), \
                 lease_token = NULL, leased_by = NULL, leased_at = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 AND lease_token = $2 AND status_id = $6",
        )
        .bind(id)
        .bind(lease_token)
        .bind(VideoStatus::Completed.id())
        .bind(metadata.duration_secs)
        .bind(metadata.fps)
        .bind(VideoStatus::Processing.id())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        DetectedObjectRepo::insert_batch(&mut *tx, id, objects).await?;
        ExtractedTextRepo::insert_batch(&mut *tx, id, texts).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Mark a leased video `failed` with a message and release the lease.
    ///
    /// Returns `false` when the caller no longer holds the lease.
    pub async fn fail(
        pool: &PgPool,
        id: VideoId,
        lease_token: Uuid,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE videos \
             SET status_id = $3, error_message = $4, completed_at = NOW(), \
                 lease_token = NULL, leased_by = NULL, leased_at = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 AND lease_token = $2 AND status_id = $5",
        )
        .bind(id)
        .bind(lease_token)
        .bind(VideoStatus::Failed.id())
        .bind(error_message)
        .bind(VideoStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Refresh `leased_at` for a lease the caller still holds.
    pub async fn renew_lease(pool: &PgPool, id: VideoId, lease_token: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE videos SET leased_at = NOW() \
             WHERE id = $1 AND lease_token = $2 AND status_id = $3",
        )
        .bind(id)
        .bind(lease_token)
        .bind(VideoStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fail every leased video whose lease was not renewed within
    /// `ttl_secs`, releasing the lease. Returns the failed rows.
    pub async fn expire_leases(pool: &PgPool, ttl_secs: f64) -> Result<Vec<VideoRow>, sqlx::Error> {
        let query = format!(
            "UPDATE videos \
             SET status_id = $1, \
                 error_message = 'Processing lease expired (worker ' || COALESCE(leased_by, 'unknown') || ')', \
                 completed_at = NOW(), \
                 lease_token = NULL, leased_by = NULL, leased_at = NULL, \
                 updated_at = NOW() \
             WHERE status_id = $2 AND lease_token IS NOT NULL \
               AND leased_at <= NOW() - make_interval(secs => $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoRow>(&query)
            .bind(VideoStatus::Failed.id())
            .bind(VideoStatus::Processing.id())
            .bind(ttl_secs)
            .fetch_all(pool)
            .await
    }

    /// Delete a video that is not being processed. Result rows cascade.
    ///
    /// Returns the deleted row, or `None` when the video is missing or
    /// currently leased.
    pub async fn delete(pool: &PgPool, id: VideoId) -> Result<Option<VideoRow>, sqlx::Error> {
        let query = format!(
            "DELETE FROM videos \
             WHERE id = $1 AND status_id <> $2 AND lease_token IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoRow>(&query)
            .bind(id)
            .bind(VideoStatus::Processing.id())
            .fetch_optional(pool)
            .await
    }
}
