//! Domain logic for the video-to-text pipeline.
//!
//! Everything here is free of database and runtime wiring so it can be
//! shared by the persistence, pipeline, and worker crates.

pub mod aggregation;
pub mod detection;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod retention;
pub mod sampling;
pub mod status;
pub mod storage;
pub mod types;
pub mod upload;
pub mod video;
