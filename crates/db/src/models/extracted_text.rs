use sqlx::FromRow;
use v2t_core::detection::ExtractedText;
use v2t_core::types::{Timestamp, VideoId};

/// A row from the `extracted_texts` table.
#[derive(Debug, Clone, FromRow)]
pub struct ExtractedTextRow {
    pub id: i64,
    pub video_id: VideoId,
    pub frame_number: i32,
    pub timestamp: f64,
    pub text: String,
    pub confidence: Option<f64>,
    pub created_at: Timestamp,
}

impl From<ExtractedTextRow> for ExtractedText {
    fn from(row: ExtractedTextRow) -> Self {
        ExtractedText {
            frame_number: row.frame_number,
            timestamp: row.timestamp,
            text: row.text,
            confidence: row.confidence,
        }
    }
}
