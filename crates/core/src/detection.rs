//! Value types produced by the detection and recognition capabilities and
//! the per-video records they become once attached to a frame.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default minimum confidence for object detections.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

// ---------------------------------------------------------------------------
// Bounding boxes
// ---------------------------------------------------------------------------

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    /// Build a box, rejecting non-finite or degenerate coordinates.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, CoreError> {
        let bbox = Self { x1, y1, x2, y2 };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check `x1 < x2` and `y1 < y2` with finite coordinates.
    pub fn validate(&self) -> Result<(), CoreError> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(CoreError::Validation(format!(
                "Bounding box has non-finite coordinates: {self:?}"
            )));
        }
        if self.x1 >= self.x2 || self.y1 >= self.y2 {
            return Err(CoreError::Validation(format!(
                "Bounding box is degenerate: ({}, {}) to ({}, {})",
                self.x1, self.y1, self.x2, self.y2
            )));
        }
        Ok(())
    }

    /// Clamp the box to a `width` x `height` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as f64, height as f64);
        let clamped = Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        };
        clamped.validate().ok().map(|_| clamped)
    }
}

// ---------------------------------------------------------------------------
// Capability output
// ---------------------------------------------------------------------------

/// One object found in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    /// Validate label, confidence range and box geometry.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.class_label.trim().is_empty() {
            return Err(CoreError::Validation(
                "Detection class label must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(CoreError::Validation(format!(
                "Detection confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        self.bbox.validate()
    }
}

/// The scale a recognizer reports its confidence in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceScale {
    /// Already in `0.0..=1.0`.
    Unit,
    /// Percentage in `0.0..=100.0` (Tesseract).
    Percent,
}

impl ConfidenceScale {
    /// Convert a raw score to `0.0..=1.0`.
    pub fn normalize(self, raw: f64) -> f64 {
        let unit = match self {
            ConfidenceScale::Unit => raw,
            ConfidenceScale::Percent => raw / 100.0,
        };
        if unit.is_finite() {
            unit.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// One recognized text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionSpan {
    pub text: String,
    pub confidence: f64,
    pub scale: ConfidenceScale,
}

/// All recognized text of one frame, combined into a single entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameText {
    pub text: String,
    /// Mean of the contributing span confidences, in `0.0..=1.0`.
    pub confidence: f64,
    pub word_count: usize,
}

/// Join spans into one space-separated string with an averaged confidence.
///
/// Spans whose trimmed text is empty do not contribute. Returns `None` when
/// no span carries text, so the frame produces no text record.
pub fn merge_spans(spans: &[RecognitionSpan]) -> Option<FrameText> {
    let words: Vec<(&str, f64)> = spans
        .iter()
        .map(|s| (s.text.trim(), s.scale.normalize(s.confidence)))
        .filter(|(text, _)| !text.is_empty())
        .collect();

    if words.is_empty() {
        return None;
    }

    let text = words
        .iter()
        .map(|(t, _)| *t)
        .collect::<Vec<_>>()
        .join(" ");
    let confidence = words.iter().map(|(_, c)| c).sum::<f64>() / words.len() as f64;

    Some(FrameText {
        text,
        confidence,
        word_count: words.len(),
    })
}

// ---------------------------------------------------------------------------
// Per-video records
// ---------------------------------------------------------------------------

/// A detection attached to a sampled frame of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub frame_number: i32,
    pub timestamp: f64,
    pub object_class: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Recognized text attached to a sampled frame of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub frame_number: i32,
    pub timestamp: f64,
    pub text: String,
    pub confidence: Option<f64>,
}
