//! Repository for the `extracted_texts` table.

use sqlx::{PgConnection, PgPool};
use v2t_core::detection::ExtractedText;
use v2t_core::types::VideoId;

use crate::models::extracted_text::ExtractedTextRow;

const COLUMNS: &str = "id, video_id, frame_number, timestamp, text, confidence, created_at";

pub struct ExtractedTextRepo;

impl ExtractedTextRepo {
    /// Insert all text entries of one video in a single statement.
    pub async fn insert_batch(
        conn: &mut PgConnection,
        video_id: VideoId,
        texts: &[ExtractedText],
    ) -> Result<u64, sqlx::Error> {
        if texts.is_empty() {
            return Ok(0);
        }

        let frames: Vec<i32> = texts.iter().map(|t| t.frame_number).collect();
        let stamps: Vec<f64> = texts.iter().map(|t| t.timestamp).collect();
        let values: Vec<String> = texts.iter().map(|t| t.text.clone()).collect();
        let confs: Vec<Option<f64>> = texts.iter().map(|t| t.confidence).collect();

        let result = sqlx::query(
            "INSERT INTO extracted_texts (video_id, frame_number, timestamp, text, confidence) \
             SELECT $1, * FROM UNNEST($2::int4[], $3::float8[], $4::text[], $5::float8[])",
        )
        .bind(video_id)
        .bind(&frames)
        .bind(&stamps)
        .bind(&values)
        .bind(&confs)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_by_video(
        pool: &PgPool,
        video_id: VideoId,
    ) -> Result<Vec<ExtractedTextRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM extracted_texts \
             WHERE video_id = $1 \
             ORDER BY frame_number, id"
        );
        sqlx::query_as::<_, ExtractedTextRow>(&query)
            .bind(video_id)
            .fetch_all(pool)
            .await
    }
}
