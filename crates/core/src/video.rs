//! The video aggregate and the read models built from it.

use std::path::PathBuf;

use serde::Serialize;

use crate::aggregation::ResultSummary;
use crate::detection::{DetectedObject, ExtractedText};
use crate::error::CoreError;
use crate::status::{StatusReport, VideoStatus};
use crate::types::{Timestamp, VideoId};

/// A stored video and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Video {
    pub id: VideoId,
    /// Name of the file as uploaded by the user.
    pub filename: String,
    /// Where the original upload lives on disk.
    pub storage_path: PathBuf,
    pub size_bytes: i64,
    pub duration_secs: Option<f64>,
    pub fps: Option<f64>,
    pub status: VideoStatus,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Video {
    /// Check the cross-field invariants of the aggregate.
    ///
    /// - `completed_at` is set exactly when the status is terminal.
    /// - `error_message` is only present on failed videos.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.status.is_terminal() != self.completed_at.is_some() {
            return Err(CoreError::Internal(format!(
                "Video {}: completed_at must be set iff status is terminal (status {})",
                self.id, self.status
            )));
        }
        if self.error_message.is_some() && self.status != VideoStatus::Failed {
            return Err(CoreError::Internal(format!(
                "Video {}: error_message present on a {} video",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport::new(self.id, self.status, self.error_message.clone())
    }

    /// Fail unless the video finished processing successfully.
    pub fn ensure_completed(&self) -> Result<(), CoreError> {
        if self.status == VideoStatus::Completed {
            Ok(())
        } else {
            Err(CoreError::Precondition(format!(
                "Video processing not completed yet. Current status: {}",
                self.status
            )))
        }
    }
}

/// Input for creating a video record at upload time.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub id: VideoId,
    pub filename: String,
    pub storage_path: PathBuf,
    pub size_bytes: i64,
}

/// Technical metadata extracted from the source file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Frame count reported by the container, or estimated from duration.
    pub total_frames: i64,
}

/// Answer to a results query for a completed video.
#[derive(Debug, Clone, Serialize)]
pub struct VideoResults {
    pub video_id: VideoId,
    pub filename: String,
    pub status: VideoStatus,
    pub duration: Option<f64>,
    pub fps: Option<f64>,
    pub total_frames: i64,
    pub detected_objects: Vec<DetectedObject>,
    pub extracted_texts: Vec<ExtractedText>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl VideoResults {
    /// Assemble the results view. Only completed videos have results.
    pub fn build(
        video: &Video,
        detected_objects: Vec<DetectedObject>,
        extracted_texts: Vec<ExtractedText>,
    ) -> Result<Self, CoreError> {
        video.ensure_completed()?;
        let total_frames = ResultSummary::total_frames(&detected_objects, &extracted_texts);
        Ok(Self {
            video_id: video.id,
            filename: video.filename.clone(),
            status: video.status,
            duration: video.duration_secs,
            fps: video.fps,
            total_frames,
            detected_objects,
            extracted_texts,
            created_at: video.created_at,
            completed_at: video.completed_at,
        })
    }
}
