//! CSV export with labelled sections.
//!
//! ```text
//! VIDEO
//! video_id,filename,status,duration,fps,total_frames,exported_at
//! ...
//!
//! DETECTED OBJECTS
//! frame_number,timestamp,object_class,confidence,x1,y1,x2,y2
//! ...
//!
//! EXTRACTED TEXTS
//! frame_number,timestamp,text,confidence
//! ...
//!
//! SUMMARY
//! metric,value
//! ...
//! ```

use csv::WriterBuilder;

use super::{optional, ExportDocument, ExportError};

pub(super) fn render(doc: &ExportDocument) -> Result<Vec<u8>, ExportError> {
    let mut wtr = WriterBuilder::new().flexible(true).from_writer(Vec::new());
    let video = &doc.video;

    wtr.write_record(["VIDEO"])?;
    wtr.write_record([
        "video_id",
        "filename",
        "status",
        "duration",
        "fps",
        "total_frames",
        "exported_at",
    ])?;
    wtr.write_record([
        video.id.to_string(),
        video.filename.clone(),
        video.status.to_string(),
        optional(video.duration_secs, 3),
        optional(video.fps, 3),
        doc.summary.total_frames.to_string(),
        doc.exported_at.to_rfc3339(),
    ])?;
    wtr.write_record([""])?;

    wtr.write_record(["DETECTED OBJECTS"])?;
    wtr.write_record([
        "frame_number",
        "timestamp",
        "object_class",
        "confidence",
        "x1",
        "y1",
        "x2",
        "y2",
    ])?;
    for obj in &doc.detected_objects {
        wtr.write_record([
            obj.frame_number.to_string(),
            format!("{:.3}", obj.timestamp),
            obj.object_class.clone(),
            format!("{:.4}", obj.confidence),
            format!("{:.2}", obj.bbox.x1),
            format!("{:.2}", obj.bbox.y1),
            format!("{:.2}", obj.bbox.x2),
            format!("{:.2}", obj.bbox.y2),
        ])?;
    }
    wtr.write_record([""])?;

    wtr.write_record(["EXTRACTED TEXTS"])?;
    wtr.write_record(["frame_number", "timestamp", "text", "confidence"])?;
    for entry in &doc.extracted_texts {
        wtr.write_record([
            entry.frame_number.to_string(),
            format!("{:.3}", entry.timestamp),
            entry.text.clone(),
            optional(entry.confidence, 4),
        ])?;
    }
    wtr.write_record([""])?;

    wtr.write_record(["SUMMARY"])?;
    wtr.write_record(["metric", "value"])?;
    wtr.write_record(["total_objects".to_string(), doc.summary.total_objects.to_string()])?;
    wtr.write_record([
        "total_text_entries".to_string(),
        doc.summary.total_text_entries.to_string(),
    ])?;
    wtr.write_record([
        "frames_with_text".to_string(),
        doc.summary.frames_with_text.to_string(),
    ])?;
    wtr.write_record([
        "unique_texts".to_string(),
        doc.narrative.unique_texts.len().to_string(),
    ])?;
    for count in &doc.summary.class_counts {
        wtr.write_record([format!("count:{}", count.object_class), count.count.to_string()])?;
    }
    wtr.write_record(["narrative".to_string(), doc.narrative.paragraph()])?;

    wtr.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}
