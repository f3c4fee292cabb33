use std::path::PathBuf;

use serde::Deserialize;
use sqlx::FromRow;
use uuid::Uuid;
use v2t_core::error::CoreError;
use v2t_core::status::{StatusId, VideoStatus};
use v2t_core::types::{Timestamp, VideoId};
use v2t_core::video::Video;

/// A row from the `videos` table.
#[derive(Debug, Clone, FromRow)]
pub struct VideoRow {
    pub id: VideoId,
    pub filename: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub duration_secs: Option<f64>,
    pub fps: Option<f64>,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub lease_token: Option<Uuid>,
    pub leased_by: Option<String>,
    pub leased_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl VideoRow {
    pub fn status(&self) -> Result<VideoStatus, CoreError> {
        VideoStatus::from_id(self.status_id)
    }
}

impl TryFrom<VideoRow> for Video {
    type Error = CoreError;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        let status = row.status()?;
        Ok(Video {
            id: row.id,
            filename: row.filename,
            storage_path: PathBuf::from(row.storage_path),
            size_bytes: row.size_bytes,
            duration_secs: row.duration_secs,
            fps: row.fps,
            status,
            error_message: row.error_message,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

/// Filter and pagination for listing videos.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoListQuery {
    pub status: Option<VideoStatus>,
    /// Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Defaults to 0.
    pub offset: Option<i64>,
}

/// Metadata written when a video completes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompletedMetadata {
    pub duration_secs: Option<f64>,
    pub fps: Option<f64>,
}
