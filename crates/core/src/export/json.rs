//! Structured JSON dump.

use serde::Serialize;

use super::{ExportDocument, ExportError};
use crate::aggregation::ClassCount;
use crate::detection::{DetectedObject, ExtractedText};
use crate::status::VideoStatus;
use crate::types::{Timestamp, VideoId};

/// Bumped when the document shape changes incompatibly.
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct JsonExport<'a> {
    video: VideoSection<'a>,
    export: ExportSection,
    summary: SummarySection<'a>,
    narrative: NarrativeSection<'a>,
    detected_objects: &'a [DetectedObject],
    extracted_texts: &'a [ExtractedText],
}

#[derive(Serialize)]
struct VideoSection<'a> {
    video_id: VideoId,
    filename: &'a str,
    status: VideoStatus,
    file_size: i64,
    duration: Option<f64>,
    fps: Option<f64>,
    created_at: Timestamp,
    completed_at: Option<Timestamp>,
}

#[derive(Serialize)]
struct ExportSection {
    format_version: u32,
    exported_at: Timestamp,
}

#[derive(Serialize)]
struct SummarySection<'a> {
    total_objects: usize,
    object_counts: &'a [ClassCount],
    total_text_entries: usize,
    frames_with_text: usize,
    total_frames: i64,
}

#[derive(Serialize)]
struct NarrativeSection<'a> {
    text: String,
    unique_texts: &'a [String],
    source_entries: usize,
}

pub(super) fn render(doc: &ExportDocument) -> Result<Vec<u8>, ExportError> {
    let video = &doc.video;
    let export = JsonExport {
        video: VideoSection {
            video_id: video.id,
            filename: &video.filename,
            status: video.status,
            file_size: video.size_bytes,
            duration: video.duration_secs,
            fps: video.fps,
            created_at: video.created_at,
            completed_at: video.completed_at,
        },
        export: ExportSection {
            format_version: FORMAT_VERSION,
            exported_at: doc.exported_at,
        },
        summary: SummarySection {
            total_objects: doc.summary.total_objects,
            object_counts: &doc.summary.class_counts,
            total_text_entries: doc.summary.total_text_entries,
            frames_with_text: doc.summary.frames_with_text,
            total_frames: doc.summary.total_frames,
        },
        narrative: NarrativeSection {
            text: doc.narrative.paragraph(),
            unique_texts: &doc.narrative.unique_texts,
            source_entries: doc.narrative.source_entries,
        },
        detected_objects: &doc.detected_objects,
        extracted_texts: &doc.extracted_texts,
    };

    let mut bytes = serde_json::to_vec_pretty(&export)?;
    bytes.push(b'\n');
    Ok(bytes)
}
