//! Upload validation, applied before any record or job exists.

use std::path::Path;

use crate::error::CoreError;
use crate::types::VideoId;

/// Accepted container extensions (lower-case, with the leading dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv", ".flv", ".wmv"];

/// Maximum accepted upload size (500 MiB).
pub const MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate an upload's file name and size.
///
/// Returns the lower-cased extension (with dot) on success.
pub fn validate_upload(filename: &str, size_bytes: u64) -> Result<String, CoreError> {
    let extension = extension_of(filename).ok_or_else(|| invalid_format(filename))?;
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(invalid_format(filename));
    }

    if size_bytes == 0 {
        return Err(CoreError::Validation("Uploaded file is empty".into()));
    }

    if size_bytes > MAX_FILE_SIZE {
        return Err(CoreError::Validation(format!(
            "File size exceeds maximum allowed size of {}MB",
            MAX_FILE_SIZE / (1024 * 1024)
        )));
    }

    Ok(extension)
}

/// File name an upload is stored under: `{video_id}{extension}`.
pub fn stored_file_name(video_id: VideoId, extension: &str) -> String {
    format!("{video_id}{extension}")
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

fn invalid_format(filename: &str) -> CoreError {
    CoreError::Validation(format!(
        "Invalid file format for '{filename}'. Allowed formats: {}",
        ALLOWED_EXTENSIONS.join(", ")
    ))
}
