//! Detection and recognition capabilities.
//!
//! Both are synchronous, per-frame calls. Implementations must be safe to
//! call from several threads at once: the orchestrator shares one instance
//! (behind an `Arc`) across every job in the process and invokes it from
//! the blocking thread pool.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Deserialize;
use v2t_core::detection::{BoundingBox, ConfidenceScale, Detection, RecognitionSpan};
use v2t_core::sampling::FrameDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("frame {0} has no image to analyze")]
    MissingImage(i32),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {}ms and was killed", .timeout.as_millis())]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} exited with code {exit_code:?}: {stderr}")]
    Failed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("unreadable output from {program}: {reason}")]
    Parse { program: String, reason: String },
}

/// Finds objects in a single frame.
pub trait DetectionCapability: Send + Sync {
    fn name(&self) -> &str;

    /// Detections with confidence at or above `threshold`, in frame pixels.
    fn detect(
        &self,
        frame: &FrameDescriptor,
        threshold: f64,
    ) -> Result<Vec<Detection>, CapabilityError>;
}

/// Reads text in a single frame.
pub trait RecognitionCapability: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, frame: &FrameDescriptor) -> Result<Vec<RecognitionSpan>, CapabilityError>;
}

fn frame_image(frame: &FrameDescriptor) -> Result<&Path, CapabilityError> {
    frame
        .image_path
        .as_deref()
        .ok_or(CapabilityError::MissingImage(frame.sequence_index))
}

/// Default deadline for one capability process.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum stdout or stderr captured per call (10 MiB).
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

/// How often a running capability process is polled for exit.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Run `command` to completion and return its stdout.
///
/// The child is killed and reaped once `timeout` passes, so a hung program
/// never outlives the call.
fn run_command(program: &str, command: &mut Command, timeout: Duration) -> Result<String, CapabilityError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CapabilityError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Pipes are drained off-thread so a chatty child never blocks on a full pipe.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CapabilityError::TimedOut {
                    program: program.to_string(),
                    timeout,
                });
            }
            Ok(None) => thread::sleep(WAIT_POLL),
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CapabilityError::Wait {
                    program: program.to_string(),
                    source,
                });
            }
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    if !status.success() {
        return Err(CapabilityError::Failed {
            program: program.to_string(),
            exit_code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = pipe {
            let _ = pipe.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf);
        }
        buf
    })
}

// ---------------------------------------------------------------------------
// External detector
// ---------------------------------------------------------------------------

/// Runs an external object detector once per frame.
///
/// The program is invoked as `<program> [args...] --threshold <t> <image>`
/// and must print a JSON array on stdout:
///
/// ```json
/// [{"class": "person", "confidence": 0.91, "bbox": {"x1": 10, "y1": 20, "x2": 110, "y2": 220}}]
/// ```
///
/// `bbox` may also be given as a four-element array `[x1, y1, x2, y2]`.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandDetector {
    /// Build from a command line such as `"yolo-detect --model yolov8n.pt"`.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    /// Kill the detector if one frame takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(alias = "label", alias = "name")]
    class: String,
    confidence: f64,
    bbox: RawBox,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBox {
    Corners { x1: f64, y1: f64, x2: f64, y2: f64 },
    List([f64; 4]),
}

impl RawBox {
    fn corners(&self) -> (f64, f64, f64, f64) {
        match *self {
            RawBox::Corners { x1, y1, x2, y2 } => (x1, y1, x2, y2),
            RawBox::List([x1, y1, x2, y2]) => (x1, y1, x2, y2),
        }
    }
}

/// Parse detector stdout. Entries with an invalid box are skipped.
pub fn parse_detections(program: &str, stdout: &str) -> Result<Vec<Detection>, CapabilityError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let raw: Vec<RawDetection> =
        serde_json::from_str(trimmed).map_err(|e| CapabilityError::Parse {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    let detections = raw
        .into_iter()
        .filter_map(|r| {
            let (x1, y1, x2, y2) = r.bbox.corners();
            let bbox = BoundingBox::new(x1, y1, x2, y2).ok()?;
            Some(Detection {
                class_label: r.class,
                confidence: r.confidence,
                bbox,
            })
        })
        .collect();
    Ok(detections)
}

impl DetectionCapability for CommandDetector {
    fn name(&self) -> &str {
        &self.program
    }

    fn detect(
        &self,
        frame: &FrameDescriptor,
        threshold: f64,
    ) -> Result<Vec<Detection>, CapabilityError> {
        let image = frame_image(frame)?;
        let stdout = run_command(
            &self.program,
            Command::new(&self.program)
                .args(&self.args)
                .arg("--threshold")
                .arg(threshold.to_string())
                .arg(image),
            self.timeout,
        )?;
        parse_detections(&self.program, &stdout)
    }
}

// ---------------------------------------------------------------------------
// Tesseract OCR
// ---------------------------------------------------------------------------

/// Runs `tesseract <image> stdout -l <lang> tsv` once per frame.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    language: String,
    timeout: Duration,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Index of the `conf` column in tesseract's TSV output.
const TSV_CONF: usize = 10;
/// Index of the `text` column.
const TSV_TEXT: usize = 11;

/// Word-level spans from tesseract TSV, keeping non-empty words with
/// positive confidence (tesseract reports `-1` for layout rows).
pub fn parse_tsv(stdout: &str) -> Vec<RecognitionSpan> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            let conf: f64 = cols.get(TSV_CONF)?.trim().parse().ok()?;
            let text = cols.get(TSV_TEXT)?.trim();
            (conf > 0.0 && !text.is_empty()).then(|| RecognitionSpan {
                text: text.to_string(),
                confidence: conf,
                scale: ConfidenceScale::Percent,
            })
        })
        .collect()
}

impl RecognitionCapability for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, frame: &FrameDescriptor) -> Result<Vec<RecognitionSpan>, CapabilityError> {
        let image = frame_image(frame)?;
        let program = self.binary.to_string_lossy();
        let stdout = run_command(
            &program,
            Command::new(&self.binary)
                .arg(image)
                .arg("stdout")
                .arg("-l")
                .arg(&self.language)
                .arg("tsv"),
            self.timeout,
        )?;
        Ok(parse_tsv(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn frame_without_image() -> FrameDescriptor {
        FrameDescriptor {
            sequence_index: 3,
            position: 30,
            timestamp_secs: 3.0,
            image_path: None,
            dimensions: None,
        }
    }

    #[test]
    fn parses_detector_json_in_both_box_shapes() {
        let out = r#"[
            {"class": "person", "confidence": 0.91, "bbox": {"x1": 10, "y1": 20, "x2": 110, "y2": 220}},
            {"label": "car", "confidence": 0.6, "bbox": [0, 0, 50, 40]}
        ]"#;
        let detections = parse_detections("det", out).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_label, "person");
        assert_eq!(detections[1].class_label, "car");
        assert_eq!(detections[1].bbox.x2, 50.0);
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let out = r#"[{"class": "cup", "confidence": 0.7, "bbox": [5, 5, 5, 9]}]"#;
        assert!(parse_detections("det", out).unwrap().is_empty());
    }

    #[test]
    fn empty_stdout_means_no_detections() {
        assert!(parse_detections("det", "  \n").unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert_matches!(
            parse_detections("det", "not json"),
            Err(CapabilityError::Parse { .. })
        );
    }

    #[test]
    fn tsv_keeps_confident_words() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t91.5\tMain\n\
                   5\t1\t1\t1\t1\t2\t70\t10\t30\t20\t88\tSt\n\
                   5\t1\t1\t1\t1\t3\t70\t10\t30\t20\t0\tnoise\n\
                   5\t1\t1\t1\t1\t4\t70\t10\t30\t20\t75\t   \n";
        let spans = parse_tsv(tsv);
        let words: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(words, vec!["Main", "St"]);
        assert_eq!(spans[0].scale, ConfidenceScale::Percent);
        assert_eq!(spans[0].confidence, 91.5);
    }

    #[test]
    fn frames_without_images_are_rejected() {
        let detector = CommandDetector::from_command_line("true").unwrap();
        assert_matches!(
            detector.detect(&frame_without_image(), 0.5),
            Err(CapabilityError::MissingImage(3))
        );
        let ocr = TesseractRecognizer::new("tesseract", "eng");
        assert_matches!(
            ocr.recognize(&frame_without_image()),
            Err(CapabilityError::MissingImage(3))
        );
    }

    #[cfg(unix)]
    fn script_detector(dir: &Path, body: &str, timeout: Duration) -> CommandDetector {
        let script = dir.join("detector.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        CommandDetector::from_command_line(&format!("sh {}", script.display()))
            .unwrap()
            .with_timeout(timeout)
    }

    #[cfg(unix)]
    fn frame_in(dir: &Path) -> FrameDescriptor {
        FrameDescriptor {
            image_path: Some(dir.join("frame_000000.jpg")),
            ..frame_without_image()
        }
    }

    #[cfg(unix)]
    fn process_alive(pid: &str) -> bool {
        Command::new("kill")
            .args(["-0", pid])
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    #[cfg(unix)]
    #[test]
    fn detector_output_is_read_from_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let detector = script_detector(
            dir.path(),
            r#"echo '[{"class": "cup", "confidence": 0.9, "bbox": [0, 0, 5, 5]}]'"#,
            Duration::from_secs(10),
        );
        let detections = detector.detect(&frame_in(dir.path()), 0.5).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_label, "cup");
    }

    #[cfg(unix)]
    #[test]
    fn failing_detector_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let detector = script_detector(dir.path(), "echo 'no model' >&2\nexit 3", Duration::from_secs(10));
        assert_matches!(
            detector.detect(&frame_in(dir.path()), 0.5),
            Err(CapabilityError::Failed { exit_code: Some(3), stderr, .. }) if stderr == "no model"
        );
    }

    #[cfg(unix)]
    #[test]
    fn hung_detector_is_killed_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let detector = script_detector(
            dir.path(),
            &format!("echo $$ > {}\nexec sleep 30", pid_file.display()),
            Duration::from_millis(500),
        );

        let started = Instant::now();
        assert_matches!(
            detector.detect(&frame_in(dir.path()), 0.5),
            Err(CapabilityError::TimedOut { .. })
        );
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(!process_alive(pid.trim()), "detector process {} survived", pid.trim());
    }

    #[test]
    fn command_line_splits_program_and_args() {
        let detector = CommandDetector::from_command_line("yolo-detect --model n.pt").unwrap();
        assert_eq!(detector.program(), "yolo-detect");
        assert_eq!(detector.args, vec!["--model", "n.pt"]);
        assert!(CommandDetector::from_command_line("   ").is_none());
    }
}
