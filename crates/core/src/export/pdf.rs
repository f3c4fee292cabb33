//! Paginated PDF report built with `lopdf`.
//!
//! Output is uncompressed and carries no creation date, so the same
//! document always encodes to the same bytes.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use super::{optional, percent, ExportDocument, ExportError};

const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN: i64 = 54;
/// Courier at 9pt is 5.4pt per glyph; this fills the text column.
const COLUMNS: usize = 92;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Style {
    Title,
    Heading,
    Body,
}

impl Style {
    fn font(self) -> &'static str {
        match self {
            Style::Title | Style::Heading => "F2",
            Style::Body => "F1",
        }
    }

    fn size(self) -> i64 {
        match self {
            Style::Title => 16,
            Style::Heading => 12,
            Style::Body => 9,
        }
    }

    fn leading(self) -> i64 {
        match self {
            Style::Title => 24,
            Style::Heading => 18,
            Style::Body => 12,
        }
    }
}

struct Line {
    style: Style,
    text: String,
}

#[derive(Default)]
struct Layout {
    lines: Vec<Line>,
}

impl Layout {
    fn push(&mut self, style: Style, text: impl AsRef<str>) {
        let clean = sanitize(text.as_ref());
        if style != Style::Body || clean.chars().count() <= COLUMNS {
            self.lines.push(Line { style, text: clean });
            return;
        }
        for chunk in wrap(&clean, COLUMNS) {
            self.lines.push(Line { style, text: chunk });
        }
    }

    fn body(&mut self, text: impl AsRef<str>) {
        self.push(Style::Body, text);
    }

    fn gap(&mut self) {
        self.push(Style::Body, "");
    }

    /// Split lines into pages by vertical space used.
    fn paginate(self) -> Vec<Vec<Line>> {
        let usable = PAGE_HEIGHT - 2 * MARGIN;
        let mut pages = Vec::new();
        let mut current = Vec::new();
        let mut used = 0;
        for line in self.lines {
            let height = line.style.leading();
            if used + height > usable && !current.is_empty() {
                pages.push(std::mem::take(&mut current));
                used = 0;
            }
            used += height;
            current.push(line);
        }
        if !current.is_empty() || pages.is_empty() {
            pages.push(current);
        }
        pages
    }
}

/// The base fonts only cover Latin-1 reliably; keep to printable ASCII.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split(' ') {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            out.push(std::mem::take(&mut current));
        }
        let mut word = word;
        while word.len() > width {
            let (head, tail) = word.split_at(width);
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            out.push(head.to_string());
            word = tail;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    out.push(current);
    out
}

fn layout(doc: &ExportDocument) -> Layout {
    let video = &doc.video;
    let mut l = Layout::default();

    l.push(Style::Title, "Video Processing Results");
    l.body(format!("Video ID:     {}", video.id));
    l.body(format!("Filename:     {}", video.filename));
    l.body(format!("Status:       {}", video.status));
    l.body(format!("Duration (s): {}", optional(video.duration_secs, 2)));
    l.body(format!("FPS:          {}", optional(video.fps, 2)));
    l.body(format!("Total Frames: {}", doc.summary.total_frames));
    l.body(format!("Export Date:  {}", doc.exported_at_display()));
    l.gap();

    l.push(
        Style::Heading,
        format!("Detected Objects ({} total)", doc.detected_objects.len()),
    );
    if doc.detected_objects.is_empty() {
        l.body("No objects detected.");
    } else {
        l.body(format!(
            "{:<6} {:>8}  {:<18} {:>10}  {}",
            "Frame", "Time", "Class", "Confidence", "Bounding Box"
        ));
        for obj in &doc.detected_objects {
            l.body(format!(
                "{:<6} {:>7.2}s  {:<18} {:>10}  ({:.0}, {:.0}) - ({:.0}, {:.0})",
                obj.frame_number,
                obj.timestamp,
                obj.object_class,
                percent(obj.confidence, 1),
                obj.bbox.x1,
                obj.bbox.y1,
                obj.bbox.x2,
                obj.bbox.y2
            ));
        }
    }
    l.gap();

    l.push(Style::Heading, "Extracted Text");
    if doc.narrative.is_empty() {
        l.body("No text extracted.");
    } else {
        l.body(doc.narrative.paragraph());
        l.body(format!(
            "(Combined from {} text entries, {} unique texts)",
            doc.narrative.source_entries,
            doc.narrative.unique_texts.len()
        ));
    }
    l.gap();

    l.push(Style::Heading, "Summary");
    for count in &doc.summary.class_counts {
        l.body(format!("  - {}: {}", count.object_class, count.count));
    }
    l.body(format!("Total Objects:      {}", doc.summary.total_objects));
    l.body(format!("Total Text Entries: {}", doc.summary.total_text_entries));
    l.body(format!("Frames With Text:   {}", doc.summary.frames_with_text));
    l
}

fn page_content(lines: &[Line]) -> Content {
    let mut operations = Vec::with_capacity(lines.len() * 4 + 2);
    let mut y = PAGE_HEIGHT - MARGIN;
    for line in lines {
        y -= line.style.leading();
        if line.text.is_empty() {
            continue;
        }
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![line.style.font().into(), Object::Integer(line.style.size())],
        ));
        operations.push(Operation::new(
            "Td",
            vec![Object::Integer(MARGIN), Object::Integer(y)],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(line.text.as_str())],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }
}

pub(super) fn render(doc: &ExportDocument) -> Result<Vec<u8>, ExportError> {
    let pages = layout(doc).paginate();

    let mut pdf = Document::with_version("1.5");
    let pages_id = pdf.new_object_id();
    let regular_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let bold_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier-Bold",
    });
    let resources_id = pdf.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for lines in &pages {
        let encoded = page_content(lines)
            .encode()
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        let content_id = pdf.add_object(Stream::new(dictionary! {}, encoded));
        let page_id: ObjectId = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    pdf.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    pdf.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    pdf.save_to(&mut bytes)
        .map_err(|e| ExportError::Pdf(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|w| w == needle.as_bytes())
    }

    #[test]
    fn produces_a_pdf_with_results() {
        let bytes = render(&sample_document()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert!(contains(&bytes, "person"));
        assert!(contains(&bytes, "Hello Main St"));
        assert!(contains(&bytes, "Total Objects:      5"));
    }

    #[test]
    fn repeated_text_is_printed_once() {
        let bytes = render(&sample_document()).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert_eq!(text.matches("Hello").count(), 1);
        assert!(!text.contains("hello"));
    }

    #[test]
    fn long_listings_span_pages() {
        let objects = (0..150).map(|i| object(i, "car", 0.75)).collect();
        let doc = ExportDocument::new(completed_video(), objects, vec![], exported_at()).unwrap();
        let bytes = render(&doc).unwrap();
        let parsed = Document::load_mem(&bytes).unwrap();
        assert!(parsed.get_pages().len() > 1);
    }

    #[test]
    fn non_ascii_is_replaced() {
        assert_eq!(sanitize("café"), "caf?");
        assert_eq!(sanitize("tab\there"), "tab?here");
    }

    #[test]
    fn wrap_splits_on_words() {
        assert_eq!(wrap("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }
}
