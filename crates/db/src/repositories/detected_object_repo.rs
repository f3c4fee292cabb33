//! Repository for the `detected_objects` table.

use sqlx::{PgConnection, PgPool};
use v2t_core::detection::DetectedObject;
use v2t_core::types::VideoId;

use crate::models::detected_object::DetectedObjectRow;

const COLUMNS: &str = "\
    id, video_id, frame_number, timestamp, object_class, confidence, \
    bbox_x1, bbox_y1, bbox_x2, bbox_y2, created_at";

pub struct DetectedObjectRepo;

impl DetectedObjectRepo {
    /// Insert all detections of one video in a single statement.
    ///
    /// Runs on a caller-owned connection so it can share the completion
    /// transaction.
    pub async fn insert_batch(
        conn: &mut PgConnection,
        video_id: VideoId,
        objects: &[DetectedObject],
    ) -> Result<u64, sqlx::Error> {
        if objects.is_empty() {
            return Ok(0);
        }

        let frames: Vec<i32> = objects.iter().map(|o| o.frame_number).collect();
        let stamps: Vec<f64> = objects.iter().map(|o| o.timestamp).collect();
        let classes: Vec<String> = objects.iter().map(|o| o.object_class.clone()).collect();
        let confs: Vec<f64> = objects.iter().map(|o| o.confidence).collect();
        let x1: Vec<f64> = objects.iter().map(|o| o.bbox.x1).collect();
        let y1: Vec<f64> = objects.iter().map(|o| o.bbox.y1).collect();
        let x2: Vec<f64> = objects.iter().map(|o| o.bbox.x2).collect();
        let y2: Vec<f64> = objects.iter().map(|o| o.bbox.y2).collect();

        let result = sqlx::query(
            "INSERT INTO detected_objects \
                (video_id, frame_number, timestamp, object_class, confidence, \
                 bbox_x1, bbox_y1, bbox_x2, bbox_y2) \
             SELECT $1, * FROM UNNEST( \
                 $2::int4[], $3::float8[], $4::text[], $5::float8[], \
                 $6::float8[], $7::float8[], $8::float8[], $9::float8[])",
        )
        .bind(video_id)
        .bind(&frames)
        .bind(&stamps)
        .bind(&classes)
        .bind(&confs)
        .bind(&x1)
        .bind(&y1)
        .bind(&x2)
        .bind(&y2)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// All detections of a video, ordered by frame then insertion order.
    pub async fn list_by_video(
        pool: &PgPool,
        video_id: VideoId,
    ) -> Result<Vec<DetectedObjectRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM detected_objects \
             WHERE video_id = $1 \
             ORDER BY frame_number, id"
        );
        sqlx::query_as::<_, DetectedObjectRow>(&query)
            .bind(video_id)
            .fetch_all(pool)
            .await
    }
}
