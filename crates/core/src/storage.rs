//! On-disk layout for uploads, extracted frames and export artifacts.
//!
//! ```text
//! uploads/{video_id}{ext}
//! frames/{video_id}/frame_000000.jpg
//! exports/video_{video_id}_results_{stamp}.{ext}
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::types::VideoId;

/// Root directories for the three storage areas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub upload_dir: PathBuf,
    pub frames_dir: PathBuf,
    pub exports_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        frames_dir: impl Into<PathBuf>,
        exports_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            frames_dir: frames_dir.into(),
            exports_dir: exports_dir.into(),
        }
    }

    /// All three areas under one root directory.
    pub fn under(root: &Path) -> Self {
        Self::new(root.join("uploads"), root.join("frames"), root.join("exports"))
    }

    /// Path an upload with the given stored file name lives at.
    pub fn upload_path(&self, stored_name: &str) -> PathBuf {
        self.upload_dir.join(stored_name)
    }

    /// Frame directory owned by one video's active job.
    pub fn frames_dir_for(&self, video_id: VideoId) -> PathBuf {
        self.frames_dir.join(video_id.to_string())
    }

    pub fn export_path(&self, file_name: &str) -> PathBuf {
        self.exports_dir.join(file_name)
    }

    /// Create the three root directories if missing.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.upload_dir, &self.frames_dir, &self.exports_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Remove a video's frame directory. Missing directories are fine.
    pub async fn remove_frames(&self, video_id: VideoId) -> std::io::Result<bool> {
        remove_dir_if_exists(&self.frames_dir_for(video_id)).await
    }
}

/// Delete a file, treating "not found" as success.
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_partitioned_by_video() {
        let layout = StorageLayout::under(Path::new("/data"));
        let id = uuid::Uuid::nil();
        assert_eq!(
            layout.frames_dir_for(id),
            PathBuf::from("/data/frames/00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(layout.upload_path("x.mp4"), PathBuf::from("/data/uploads/x.mp4"));
    }

    #[tokio::test]
    async fn remove_frames_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::under(root.path());
        let id = uuid::Uuid::new_v4();
        let dir = layout.frames_dir_for(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("frame_000000.jpg"), b"jpg").unwrap();

        assert!(layout.remove_frames(id).await.unwrap());
        assert!(!dir.exists());
        assert!(!layout.remove_frames(id).await.unwrap());
    }

    #[tokio::test]
    async fn remove_missing_file_reports_false() {
        let root = tempfile::tempdir().unwrap();
        assert!(!remove_file_if_exists(&root.path().join("nope")).await.unwrap());
    }
}
