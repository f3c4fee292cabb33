//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or a connection inside a transaction) as the first
//! argument.

pub mod detected_object_repo;
pub mod extracted_text_repo;
pub mod video_repo;

pub use detected_object_repo::DetectedObjectRepo;
pub use extracted_text_repo::ExtractedTextRepo;
pub use video_repo::VideoRepo;
