//! Row models for the `videos`, `detected_objects` and `extracted_texts`
//! tables, with conversions into the domain types of `v2t-core`.

pub mod detected_object;
pub mod extracted_text;
pub mod video;
