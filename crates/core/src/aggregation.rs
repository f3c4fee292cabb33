//! Merging per-frame capability output into video-scoped result sets and
//! computing the statistics shown in exports.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::detection::{DetectedObject, Detection, ExtractedText, FrameText};
use crate::sampling::FrameDescriptor;
use crate::types::VideoId;

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FrameResults {
    timestamp: f64,
    detections: Vec<Detection>,
    text: Option<FrameText>,
}

/// Collects detection and text results for one video, keyed by frame.
///
/// Frames may be recorded in any order; output is always in frame order,
/// with detections inside a frame kept in capability order.
#[derive(Debug)]
pub struct ResultAggregator {
    video_id: VideoId,
    frames: BTreeMap<i32, FrameResults>,
}

/// Everything the pipeline persists for one successful run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResults {
    pub frames_processed: usize,
    pub detected_objects: Vec<DetectedObject>,
    pub extracted_texts: Vec<ExtractedText>,
}

impl ResultAggregator {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            video_id,
            frames: BTreeMap::new(),
        }
    }

    pub fn video_id(&self) -> VideoId {
        self.video_id
    }

    /// Record the output of both capabilities for one frame.
    ///
    /// A frame whose capabilities failed is still recorded with empty
    /// results so it counts towards `frames_processed`.
    pub fn record_frame(
        &mut self,
        frame: &FrameDescriptor,
        detections: Vec<Detection>,
        text: Option<FrameText>,
    ) {
        let entry = self.frames.entry(frame.sequence_index).or_default();
        entry.timestamp = frame.timestamp_secs;
        entry.detections.extend(detections);
        if text.is_some() {
            entry.text = text;
        }
    }

    pub fn frames_processed(&self) -> usize {
        self.frames.len()
    }

    pub fn finish(self) -> AggregatedResults {
        let frames_processed = self.frames.len();
        let mut detected_objects = Vec::new();
        let mut extracted_texts = Vec::new();

        for (frame_number, frame) in self.frames {
            for det in frame.detections {
                detected_objects.push(DetectedObject {
                    frame_number,
                    timestamp: frame.timestamp,
                    object_class: det.class_label,
                    confidence: det.confidence,
                    bbox: det.bbox,
                });
            }
            if let Some(text) = frame.text.filter(|t| !t.text.trim().is_empty()) {
                extracted_texts.push(ExtractedText {
                    frame_number,
                    timestamp: frame.timestamp,
                    text: text.text,
                    confidence: Some(text.confidence),
                });
            }
        }

        AggregatedResults {
            frames_processed,
            detected_objects,
            extracted_texts,
        }
    }
}

// ---------------------------------------------------------------------------
// Summary statistics
// ---------------------------------------------------------------------------

/// Number of detections of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassCount {
    pub object_class: String,
    pub count: usize,
}

/// Derived counts consumed by every export format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub total_objects: usize,
    /// Sorted by descending count, ties in first-seen order.
    pub class_counts: Vec<ClassCount>,
    pub total_text_entries: usize,
    pub frames_with_text: usize,
    pub total_frames: i64,
}

impl ResultSummary {
    pub fn compute(objects: &[DetectedObject], texts: &[ExtractedText]) -> Self {
        Self {
            total_objects: objects.len(),
            class_counts: class_counts(objects),
            total_text_entries: texts.len(),
            frames_with_text: texts
                .iter()
                .map(|t| t.frame_number)
                .collect::<HashSet<_>>()
                .len(),
            total_frames: Self::total_frames(objects, texts),
        }
    }

    /// `max(frame_number) + 1` across both record kinds, `0` when empty.
    pub fn total_frames(objects: &[DetectedObject], texts: &[ExtractedText]) -> i64 {
        objects
            .iter()
            .map(|o| o.frame_number)
            .chain(texts.iter().map(|t| t.frame_number))
            .max()
            .map(|max| max as i64 + 1)
            .unwrap_or(0)
    }
}

fn class_counts(objects: &[DetectedObject]) -> Vec<ClassCount> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for obj in objects {
        let label = obj.object_class.as_str();
        let count = counts.entry(label).or_insert(0);
        if *count == 0 {
            order.push(label);
        }
        *count += 1;
    }

    let mut result: Vec<ClassCount> = order
        .into_iter()
        .map(|label| ClassCount {
            object_class: label.to_string(),
            count: counts[label],
        })
        .collect();
    // Stable sort keeps first-seen order among equal counts.
    result.sort_by(|a, b| b.count.cmp(&a.count));
    result
}

// ---------------------------------------------------------------------------
// Combined narrative
// ---------------------------------------------------------------------------

/// Deduplicated text of a video, in first-appearance order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narrative {
    /// First original-cased occurrence of each distinct text, trimmed.
    pub unique_texts: Vec<String>,
    /// Number of text entries the narrative was built from.
    pub source_entries: usize,
}

impl Narrative {
    /// Entries are duplicates when their trimmed, case-folded forms match.
    pub fn build(texts: &[ExtractedText]) -> Self {
        let mut seen = HashSet::new();
        let mut unique_texts = Vec::new();
        for entry in texts {
            let trimmed = entry.text.trim();
            let normalized = trimmed.to_lowercase();
            if normalized.is_empty() {
                continue;
            }
            if seen.insert(normalized) {
                unique_texts.push(trimmed.to_string());
            }
        }
        Self {
            unique_texts,
            source_entries: texts.len(),
        }
    }

    pub fn paragraph(&self) -> String {
        self.unique_texts.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.unique_texts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn frame(index: i32, ts: f64) -> FrameDescriptor {
        FrameDescriptor {
            sequence_index: index,
            position: index as i64,
            timestamp_secs: ts,
            image_path: None,
            dimensions: None,
        }
    }

    fn det(label: &str, confidence: f64) -> Detection {
        Detection {
            class_label: label.to_string(),
            confidence,
            bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0).unwrap(),
        }
    }

    fn obj(frame_number: i32, label: &str) -> DetectedObject {
        DetectedObject {
            frame_number,
            timestamp: frame_number as f64,
            object_class: label.to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0).unwrap(),
        }
    }

    fn text(frame_number: i32, value: &str) -> ExtractedText {
        ExtractedText {
            frame_number,
            timestamp: frame_number as f64,
            text: value.to_string(),
            confidence: Some(0.9),
        }
    }

    #[test]
    fn out_of_order_frames_come_out_sorted() {
        let mut agg = ResultAggregator::new(uuid::Uuid::nil());
        agg.record_frame(&frame(2, 2.0), vec![det("car", 0.6)], None);
        agg.record_frame(&frame(0, 0.0), vec![det("person", 0.9)], None);
        agg.record_frame(&frame(1, 1.0), vec![], None);

        let results = agg.finish();
        assert_eq!(results.frames_processed, 3);
        let frames: Vec<i32> = results.detected_objects.iter().map(|o| o.frame_number).collect();
        assert_eq!(frames, vec![0, 2]);
        assert_eq!(results.detected_objects[1].timestamp, 2.0);
    }

    #[test]
    fn text_attaches_to_frame() {
        let mut agg = ResultAggregator::new(uuid::Uuid::nil());
        let ft = FrameText {
            text: "EXIT".into(),
            confidence: 0.7,
            word_count: 1,
        };
        agg.record_frame(&frame(3, 1.5), vec![], Some(ft));
        let results = agg.finish();
        assert_eq!(results.extracted_texts, vec![ExtractedText {
            frame_number: 3,
            timestamp: 1.5,
            text: "EXIT".into(),
            confidence: Some(0.7),
        }]);
    }

    #[test]
    fn class_counts_sort_by_count_then_first_seen() {
        let objects = vec![
            obj(0, "car"),
            obj(0, "person"),
            obj(1, "person"),
            obj(1, "car"),
            obj(2, "person"),
            obj(3, "dog"),
        ];
        let summary = ResultSummary::compute(&objects, &[]);
        let counts: Vec<(&str, usize)> = summary
            .class_counts
            .iter()
            .map(|c| (c.object_class.as_str(), c.count))
            .collect();
        assert_eq!(counts, vec![("person", 3), ("car", 2), ("dog", 1)]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let objects = vec![obj(0, "bus"), obj(0, "cat"), obj(1, "cat"), obj(1, "bus")];
        let summary = ResultSummary::compute(&objects, &[]);
        assert_eq!(summary.class_counts[0].object_class, "bus");
        assert_eq!(summary.class_counts[1].object_class, "cat");
    }

    #[test]
    fn total_frames_spans_both_record_kinds() {
        assert_eq!(ResultSummary::total_frames(&[], &[]), 0);
        assert_eq!(ResultSummary::total_frames(&[obj(4, "car")], &[text(9, "hi")]), 10);
        assert_eq!(ResultSummary::total_frames(&[obj(0, "car")], &[]), 1);
    }

    #[test]
    fn frames_with_text_counts_distinct_frames() {
        let texts = vec![text(1, "a"), text(1, "b"), text(4, "c")];
        let summary = ResultSummary::compute(&[], &texts);
        assert_eq!(summary.frames_with_text, 2);
        assert_eq!(summary.total_text_entries, 3);
    }

    #[test]
    fn narrative_keeps_first_casing_once() {
        let texts = vec![text(0, "Hello"), text(3, " hello "), text(5, "World")];
        let narrative = Narrative::build(&texts);
        assert_eq!(narrative.unique_texts, vec!["Hello", "World"]);
        assert_eq!(narrative.source_entries, 3);
        assert_eq!(narrative.paragraph(), "Hello World");
    }

    #[test]
    fn narrative_skips_blank_entries() {
        let narrative = Narrative::build(&[text(0, "   ")]);
        assert!(narrative.is_empty());
    }
}
