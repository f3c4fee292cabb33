//! Deterministic, evenly spaced frame sampling.
//!
//! A frame at raw decode position `p` is sampled when
//! `p % frame_step == 0`, where `frame_step = round(fps * interval)`.
//! Sampled frames are numbered from 0 in decode order and stamped with
//! `p / fps` seconds.

use std::path::PathBuf;

/// Errors raised before any frame is produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SamplingError {
    #[error("source frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),

    #[error("sampling interval must be positive, got {0}s")]
    InvalidInterval(f64),

    #[error("frame step rounds to {step} for {fps} fps at {interval}s intervals")]
    InvalidFrameStep { fps: f64, interval: f64, step: i64 },
}

/// One sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescriptor {
    /// Index among sampled frames, starting at 0.
    pub sequence_index: i32,
    /// Raw decode position in the source video.
    pub position: i64,
    pub timestamp_secs: f64,
    /// Extracted image on disk, if the frame was materialised.
    pub image_path: Option<PathBuf>,
    /// Pixel dimensions of the extracted image, when known.
    pub dimensions: Option<(u32, u32)>,
}

/// Sampling parameters resolved against a source frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    source_fps: f64,
    interval_secs: f64,
    frame_step: i64,
}

impl SamplingPlan {
    pub fn new(source_fps: f64, interval_secs: f64) -> Result<Self, SamplingError> {
        if !source_fps.is_finite() || source_fps <= 0.0 {
            return Err(SamplingError::InvalidFrameRate(source_fps));
        }
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(SamplingError::InvalidInterval(interval_secs));
        }
        let step = (source_fps * interval_secs).round() as i64;
        if step <= 0 {
            return Err(SamplingError::InvalidFrameStep {
                fps: source_fps,
                interval: interval_secs,
                step,
            });
        }
        Ok(Self {
            source_fps,
            interval_secs,
            frame_step: step,
        })
    }

    pub fn source_fps(&self) -> f64 {
        self.source_fps
    }

    pub fn interval_secs(&self) -> f64 {
        self.interval_secs
    }

    pub fn frame_step(&self) -> i64 {
        self.frame_step
    }

    pub fn is_sampled(&self, position: i64) -> bool {
        position >= 0 && position % self.frame_step == 0
    }

    pub fn timestamp_at(&self, position: i64) -> f64 {
        position as f64 / self.source_fps
    }

    /// Raw position of the `sequence_index`-th sampled frame.
    pub fn position_of(&self, sequence_index: i32) -> i64 {
        sequence_index as i64 * self.frame_step
    }

    /// Sampled descriptors for a source with `total_frames` decodable frames.
    pub fn positions(&self, total_frames: i64) -> SampledFrames {
        let count = if total_frames <= 0 {
            0
        } else {
            (total_frames + self.frame_step - 1) / self.frame_step
        };
        let plan = *self;
        let frames = (0..count)
            .map(|i| {
                let position = i * plan.frame_step;
                FrameDescriptor {
                    sequence_index: i as i32,
                    position,
                    timestamp_secs: plan.timestamp_at(position),
                    image_path: None,
                    dimensions: None,
                }
            })
            .collect();
        SampledFrames::new(frames)
    }

    /// Describe already-extracted frame images, in sequence order.
    pub fn describe_images(&self, images: Vec<(PathBuf, Option<(u32, u32)>)>) -> SampledFrames {
        let frames = images
            .into_iter()
            .enumerate()
            .map(|(i, (path, dimensions))| {
                let sequence_index = i as i32;
                let position = self.position_of(sequence_index);
                FrameDescriptor {
                    sequence_index,
                    position,
                    timestamp_secs: self.timestamp_at(position),
                    image_path: Some(path),
                    dimensions,
                }
            })
            .collect();
        SampledFrames::new(frames)
    }
}

/// Finite, ordered sequence of sampled frames, consumed once.
#[derive(Debug)]
pub struct SampledFrames {
    inner: std::vec::IntoIter<FrameDescriptor>,
}

impl SampledFrames {
    pub fn new(frames: Vec<FrameDescriptor>) -> Self {
        Self {
            inner: frames.into_iter(),
        }
    }
}

impl Iterator for SampledFrames {
    type Item = FrameDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for SampledFrames {}
