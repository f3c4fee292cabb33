//! Rendering completed results into downloadable artifacts.
//!
//! Every format carries the same facts: video information, the per-object
//! listing (ordered by frame), the recognized text, and the summary counts.
//! Rendering is a pure function of an [`ExportDocument`]; the only input
//! that varies between two renders of unchanged results is `exported_at`.

mod json;
mod pdf;
mod tabular;
mod text;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::aggregation::{Narrative, ResultSummary};
use crate::detection::{DetectedObject, ExtractedText};
use crate::error::CoreError;
use crate::status::VideoStatus;
use crate::types::Timestamp;
use crate::video::Video;

/// Timestamp format used in export file names.
const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Timestamp format printed inside exports.
pub(crate) const DISPLAY_STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Video processing not completed yet. Current status: {0}")]
    NotCompleted(VideoStatus),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PDF encoding failed: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExportError> for CoreError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::NotCompleted(_) => CoreError::Precondition(err.to_string()),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

/// Supported export encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Plain narrative text report.
    Text,
    /// Paginated PDF document.
    Pdf,
    /// Sectioned CSV.
    Csv,
    /// Full structured dump.
    Json,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Text,
        ExportFormat::Pdf,
        ExportFormat::Csv,
        ExportFormat::Json,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(ExportFormat::Text),
            "pdf" => Ok(ExportFormat::Pdf),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(CoreError::Validation(format!(
                "Unknown export format '{other}'. Must be one of: txt, pdf, csv, json"
            ))),
        }
    }
}

/// Everything an export is rendered from.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub video: Video,
    /// Sorted by frame number, then capability order.
    pub detected_objects: Vec<DetectedObject>,
    /// Sorted by frame number.
    pub extracted_texts: Vec<ExtractedText>,
    pub summary: ResultSummary,
    pub narrative: Narrative,
    pub exported_at: Timestamp,
}

impl ExportDocument {
    /// Assemble a document for a completed video.
    ///
    /// Records are stably re-sorted by frame number so every format lists
    /// them in the same order regardless of how they were loaded.
    pub fn new(
        video: Video,
        mut detected_objects: Vec<DetectedObject>,
        mut extracted_texts: Vec<ExtractedText>,
        exported_at: Timestamp,
    ) -> Result<Self, ExportError> {
        if video.status != VideoStatus::Completed {
            return Err(ExportError::NotCompleted(video.status));
        }
        detected_objects.sort_by_key(|o| o.frame_number);
        extracted_texts.sort_by_key(|t| t.frame_number);
        let summary = ResultSummary::compute(&detected_objects, &extracted_texts);
        let narrative = Narrative::build(&extracted_texts);
        Ok(Self {
            video,
            detected_objects,
            extracted_texts,
            summary,
            narrative,
            exported_at,
        })
    }

    /// Deterministic artifact name: `video_{id}_results_{YYYYmmdd_HHMMSS}.{ext}`.
    pub fn file_name(&self, format: ExportFormat) -> String {
        format!(
            "video_{}_results_{}.{}",
            self.video.id,
            self.exported_at.format(FILE_STAMP_FORMAT),
            format.extension()
        )
    }

    pub(crate) fn exported_at_display(&self) -> String {
        self.exported_at.format(DISPLAY_STAMP_FORMAT).to_string()
    }
}

/// Render `doc` in `format`.
pub fn render(format: ExportFormat, doc: &ExportDocument) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Text => Ok(text::render(doc).into_bytes()),
        ExportFormat::Pdf => pdf::render(doc),
        ExportFormat::Csv => tabular::render(doc),
        ExportFormat::Json => json::render(doc),
    }
}

/// Format a `0..=1` confidence as a percentage with `decimals` places.
pub(crate) fn percent(confidence: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, confidence * 100.0)
}

/// Format an optional number, using `-` when absent.
pub(crate) fn optional(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use chrono::TimeZone;

    use super::*;
    use crate::detection::BoundingBox;

    pub fn exported_at() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    pub fn completed_video() -> Video {
        let created = chrono::Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
        Video {
            id: uuid::Uuid::parse_str("7f1d3c52-9a47-4e1e-8c1b-2a5d6e7f8091").unwrap(),
            filename: "street.mp4".into(),
            storage_path: PathBuf::from("/data/uploads/street.mp4"),
            size_bytes: 2048,
            duration_secs: Some(5.0),
            fps: Some(10.0),
            status: VideoStatus::Completed,
            error_message: None,
            created_at: created,
            completed_at: Some(created + chrono::Duration::seconds(42)),
        }
    }

    pub fn object(frame_number: i32, class: &str, confidence: f64) -> DetectedObject {
        DetectedObject {
            frame_number,
            timestamp: frame_number as f64,
            object_class: class.to_string(),
            confidence,
            bbox: BoundingBox::new(10.0, 20.0, 110.0, 220.0).unwrap(),
        }
    }

    pub fn text(frame_number: i32, value: &str, confidence: f64) -> ExtractedText {
        ExtractedText {
            frame_number,
            timestamp: frame_number as f64,
            text: value.to_string(),
            confidence: Some(confidence),
        }
    }

    /// Three people and two cars, with "Hello" appearing twice.
    pub fn sample_document() -> ExportDocument {
        ExportDocument::new(
            completed_video(),
            vec![
                object(3, "car", 0.55),
                object(0, "person", 0.9),
                object(1, "person", 0.7),
                object(4, "car", 0.81),
                object(2, "person", 0.6),
            ],
            vec![text(1, "Hello", 0.9), text(3, "hello", 0.8), text(4, "Main St", 0.75)],
            exported_at(),
        )
        .unwrap()
    }
}
