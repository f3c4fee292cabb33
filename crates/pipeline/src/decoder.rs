//! Video decoding seam: metadata probing and sampled frame extraction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use v2t_core::ffmpeg::{self, FfmpegError};
use v2t_core::sampling::{SampledFrames, SamplingPlan};
use v2t_core::video::VideoMetadata;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error("frame inspection failed: {0}")]
    Inspect(String),
}

/// Turns a source video into metadata and sampled frame descriptors.
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    async fn probe(&self, source: &Path) -> Result<VideoMetadata, DecodeError>;

    /// Write the frames selected by `plan` into `frames_dir` and describe
    /// them in sequence order.
    async fn sample(
        &self,
        source: &Path,
        plan: &SamplingPlan,
        frames_dir: &Path,
    ) -> Result<SampledFrames, DecodeError>;
}

/// Decoder backed by the `ffprobe` and `ffmpeg` binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegDecoder;

#[async_trait]
impl VideoDecoder for FfmpegDecoder {
    async fn probe(&self, source: &Path) -> Result<VideoMetadata, DecodeError> {
        Ok(ffmpeg::extract_metadata(source).await?)
    }

    async fn sample(
        &self,
        source: &Path,
        plan: &SamplingPlan,
        frames_dir: &Path,
    ) -> Result<SampledFrames, DecodeError> {
        let files = ffmpeg::extract_sampled_frames(source, frames_dir, plan).await?;
        let described = tokio::task::spawn_blocking(move || with_dimensions(files))
            .await
            .map_err(|e| DecodeError::Inspect(e.to_string()))?;
        Ok(plan.describe_images(described))
    }
}

/// Pair each frame file with its pixel size, read from the image header.
///
/// Unreadable headers leave the size unknown; detections on that frame
/// are then kept unclamped.
fn with_dimensions(files: Vec<PathBuf>) -> Vec<(PathBuf, Option<(u32, u32)>)> {
    files
        .into_iter()
        .map(|path| {
            let dims = match image::image_dimensions(&path) {
                Ok(dims) => Some(dims),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Frame header unreadable");
                    None
                }
            };
            (path, dims)
        })
        .collect()
}
