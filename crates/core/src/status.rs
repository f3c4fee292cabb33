//! Video processing lifecycle.
//!
//! ```text
//! Uploaded ──► Processing ──► Completed
//!                   │
//!                   └───────► Failed
//! ```
//!
//! `Uploaded` is set once when the record is created. `Completed` and
//! `Failed` are terminal. Discriminants match the seed order of the
//! `video_statuses` lookup table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::VideoId;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Coarse progress reported while a video is being processed.
pub const PROGRESS_PROCESSING: u8 = 50;

/// Progress reported once results are available.
pub const PROGRESS_COMPLETE: u8 = 100;

#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploaded = 1,
    Processing = 2,
    Completed = 3,
    Failed = 4,
}

impl VideoStatus {
    pub const ALL: [VideoStatus; 4] = [
        VideoStatus::Uploaded,
        VideoStatus::Processing,
        VideoStatus::Completed,
        VideoStatus::Failed,
    ];

    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Map a database status ID back to the enum.
    pub fn from_id(id: StatusId) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| CoreError::Internal(format!("Unknown video status id {id}")))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        }
    }

    /// `true` for states no automatic transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, VideoStatus::Completed | VideoStatus::Failed)
    }

    /// Coarse lifecycle progress: 0, 50, 100, or 0 after a failure.
    pub fn progress(self) -> u8 {
        match self {
            VideoStatus::Uploaded => 0,
            VideoStatus::Processing => PROGRESS_PROCESSING,
            VideoStatus::Completed => PROGRESS_COMPLETE,
            VideoStatus::Failed => 0,
        }
    }

    /// Human-readable description shown alongside the status.
    pub fn message(self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "Video uploaded, waiting to be processed",
            VideoStatus::Processing => "Processing video frames and extracting data",
            VideoStatus::Completed => "Processing completed successfully",
            VideoStatus::Failed => "Processing failed",
        }
    }

    pub fn can_transition_to(self, next: VideoStatus) -> bool {
        matches!(
            (self, next),
            (VideoStatus::Uploaded, VideoStatus::Processing)
                | (VideoStatus::Processing, VideoStatus::Completed)
                | (VideoStatus::Processing, VideoStatus::Failed)
        )
    }

    /// Validate a transition, returning the new status.
    ///
    /// Leaving a terminal state requires a new processing attempt, which is
    /// never expressed as a transition on the existing record.
    pub fn transition_to(self, next: VideoStatus) -> Result<VideoStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::Conflict(format!(
                "Invalid status transition: {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uploaded" => Ok(VideoStatus::Uploaded),
            "processing" => Ok(VideoStatus::Processing),
            "completed" => Ok(VideoStatus::Completed),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown status '{other}'. Must be one of: uploaded, processing, completed, failed"
            ))),
        }
    }
}

impl From<VideoStatus> for StatusId {
    fn from(value: VideoStatus) -> Self {
        value as StatusId
    }
}

/// Answer to a status query for one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub video_id: VideoId,
    pub status: VideoStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatusReport {
    pub fn new(video_id: VideoId, status: VideoStatus, error_message: Option<String>) -> Self {
        Self {
            video_id,
            status,
            progress: status.progress(),
            message: status.message().to_string(),
            error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert_eq!(
            VideoStatus::Uploaded.transition_to(VideoStatus::Processing).unwrap(),
            VideoStatus::Processing
        );
        assert!(VideoStatus::Processing.can_transition_to(VideoStatus::Completed));
        assert!(VideoStatus::Processing.can_transition_to(VideoStatus::Failed));
    }

    #[test]
    fn terminal_states_cannot_reenter_processing() {
        for terminal in [VideoStatus::Completed, VideoStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in VideoStatus::ALL {
                assert_matches!(terminal.transition_to(next), Err(CoreError::Conflict(_)));
            }
        }
    }

    #[test]
    fn uploaded_cannot_skip_processing() {
        assert!(!VideoStatus::Uploaded.can_transition_to(VideoStatus::Completed));
        assert!(!VideoStatus::Uploaded.can_transition_to(VideoStatus::Failed));
        assert!(!VideoStatus::Processing.can_transition_to(VideoStatus::Processing));
    }

    #[test]
    fn progress_is_coarse() {
        assert_eq!(VideoStatus::Uploaded.progress(), 0);
        assert_eq!(VideoStatus::Processing.progress(), 50);
        assert_eq!(VideoStatus::Completed.progress(), 100);
        assert_eq!(VideoStatus::Failed.progress(), 0);
    }

    #[test]
    fn ids_round_trip_through_lookup() {
        for status in VideoStatus::ALL {
            assert_eq!(VideoStatus::from_id(status.id()).unwrap(), status);
        }
        assert_matches!(VideoStatus::from_id(9), Err(CoreError::Internal(_)));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Completed".parse::<VideoStatus>().unwrap(), VideoStatus::Completed);
        assert_matches!("done".parse::<VideoStatus>(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn status_report_serializes_lowercase() {
        let id = uuid::Uuid::nil();
        let report = StatusReport::new(id, VideoStatus::Processing, None);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["progress"], 50);
        assert!(json.get("error_message").is_none());
    }
}
