use sqlx::FromRow;
use v2t_core::detection::{BoundingBox, DetectedObject};
use v2t_core::types::{Timestamp, VideoId};

/// A row from the `detected_objects` table.
#[derive(Debug, Clone, FromRow)]
pub struct DetectedObjectRow {
    pub id: i64,
    pub video_id: VideoId,
    pub frame_number: i32,
    pub timestamp: f64,
    pub object_class: String,
    pub confidence: f64,
    pub bbox_x1: f64,
    pub bbox_y1: f64,
    pub bbox_x2: f64,
    pub bbox_y2: f64,
    pub created_at: Timestamp,
}

impl From<DetectedObjectRow> for DetectedObject {
    fn from(row: DetectedObjectRow) -> Self {
        // The table's CHECK constraints guarantee an ordered box.
        DetectedObject {
            frame_number: row.frame_number,
            timestamp: row.timestamp,
            object_class: row.object_class,
            confidence: row.confidence,
            bbox: BoundingBox {
                x1: row.bbox_x1,
                y1: row.bbox_y1,
                x2: row.bbox_x2,
                y2: row.bbox_y2,
            },
        }
    }
}
