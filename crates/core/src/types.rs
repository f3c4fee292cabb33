/// Videos are identified by a random UUID assigned at upload.
pub type VideoId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh video identifier.
pub fn new_video_id() -> VideoId {
    uuid::Uuid::new_v4()
}
