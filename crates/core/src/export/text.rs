//! Plain-text report.

use std::fmt::Write;

use super::{optional, percent, ExportDocument};

const WIDTH: usize = 80;

pub(super) fn render(doc: &ExportDocument) -> String {
    let heavy = "=".repeat(WIDTH);
    let light = "-".repeat(WIDTH);
    let video = &doc.video;
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{heavy}");
    let _ = writeln!(out, "VIDEO PROCESSING RESULTS");
    let _ = writeln!(out, "{heavy}\n");

    let _ = writeln!(out, "Video ID: {}", video.id);
    let _ = writeln!(out, "Filename: {}", video.filename);
    let _ = writeln!(out, "Status: {}", video.status);
    let _ = writeln!(out, "Duration (s): {}", optional(video.duration_secs, 2));
    let _ = writeln!(out, "FPS: {}", optional(video.fps, 2));
    let _ = writeln!(out, "Total Frames: {}", doc.summary.total_frames);
    let _ = writeln!(out, "Export Date: {}\n", doc.exported_at_display());

    let _ = writeln!(out, "{light}");
    let _ = writeln!(out, "DETECTED OBJECTS ({} total)", doc.detected_objects.len());
    let _ = writeln!(out, "{light}\n");

    if doc.detected_objects.is_empty() {
        let _ = writeln!(out, "No objects detected.\n");
    }
    for (idx, obj) in doc.detected_objects.iter().enumerate() {
        let _ = writeln!(out, "{}. Object: {}", idx + 1, obj.object_class);
        let _ = writeln!(out, "   Confidence: {}", percent(obj.confidence, 2));
        let _ = writeln!(out, "   Frame: {} (t={:.2}s)", obj.frame_number, obj.timestamp);
        let _ = writeln!(
            out,
            "   Bounding Box: x1={:.1}, y1={:.1}, x2={:.1}, y2={:.1}\n",
            obj.bbox.x1, obj.bbox.y1, obj.bbox.x2, obj.bbox.y2
        );
    }

    let _ = writeln!(out, "{light}");
    let _ = writeln!(out, "EXTRACTED TEXT");
    let _ = writeln!(out, "{light}\n");

    if doc.extracted_texts.is_empty() {
        let _ = writeln!(out, "No text extracted.\n");
    } else if doc.narrative.is_empty() {
        let _ = writeln!(out, "No readable text extracted.\n");
    } else {
        let _ = writeln!(out, "{}\n", doc.narrative.paragraph());
        let _ = writeln!(
            out,
            "(Combined from {} text entries, {} unique texts)\n",
            doc.narrative.source_entries,
            doc.narrative.unique_texts.len()
        );
    }

    let _ = writeln!(out, "{heavy}");
    let _ = writeln!(out, "SUMMARY");
    let _ = writeln!(out, "{heavy}\n");

    let _ = writeln!(out, "Object Detection Summary:");
    if doc.summary.class_counts.is_empty() {
        let _ = writeln!(out, "  No objects detected");
    }
    for count in &doc.summary.class_counts {
        let _ = writeln!(out, "  - {}: {}", count.object_class, count.count);
    }

    let _ = writeln!(out, "\nTotal Objects: {}", doc.summary.total_objects);
    let _ = writeln!(out, "Total Text Entries: {}", doc.summary.total_text_entries);
    let _ = writeln!(out, "Frames With Text: {}", doc.summary.frames_with_text);

    let _ = writeln!(out, "\n{heavy}");
    let _ = writeln!(out, "End of Report");
    let _ = writeln!(out, "{heavy}");

    out
}
