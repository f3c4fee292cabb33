//! Operations offered to users of the worker: registering uploads, querying
//! status and results, exporting, deleting and listing videos.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use v2t_core::error::CoreError;
use v2t_core::export::{self, ExportDocument, ExportFormat};
use v2t_core::status::StatusReport;
use v2t_core::storage::{remove_file_if_exists, StorageLayout};
use v2t_core::types::{new_video_id, Timestamp, VideoId};
use v2t_core::upload::{stored_file_name, validate_upload};
use v2t_core::video::{NewVideo, Video, VideoResults};
use v2t_db::models::video::VideoListQuery;
use v2t_pipeline::store::{StoreError, VideoStore};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    /// The domain error behind this one, if any.
    pub fn core(&self) -> Option<&CoreError> {
        match self {
            ServiceError::Core(e) | ServiceError::Store(StoreError::Core(e)) => Some(e),
            _ => None,
        }
    }
}

fn io_error(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> ServiceError {
    let context = context.into();
    move |source| ServiceError::Io { context, source }
}

/// A written export artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub path: PathBuf,
    pub size_bytes: usize,
}

/// What a delete removed besides the record.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteReport {
    pub video: Video,
    pub removed_source: bool,
    pub removed_frames: bool,
}

#[derive(Clone)]
pub struct VideoService {
    store: Arc<dyn VideoStore>,
    layout: StorageLayout,
}

impl VideoService {
    pub fn new(store: Arc<dyn VideoStore>, layout: StorageLayout) -> Self {
        Self { store, layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Validate `source`, copy it into the upload area as `{id}{ext}` and
    /// record it as `uploaded`.
    ///
    /// `display_name` overrides the file name used for validation and
    /// shown in reports. Nothing is stored when validation fails.
    pub async fn register_upload(
        &self,
        source: &Path,
        display_name: Option<&str>,
    ) -> Result<Video, ServiceError> {
        let filename = match display_name {
            Some(name) => name.to_string(),
            None => source
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    CoreError::Validation(format!("{} has no usable file name", source.display()))
                })?,
        };
        let size = tokio::fs::metadata(source)
            .await
            .map_err(io_error(format!("reading {}", source.display())))?
            .len();
        let extension = validate_upload(&filename, size)?;

        let id = new_video_id();
        let storage_path = self.layout.upload_path(&stored_file_name(id, &extension));
        tokio::fs::create_dir_all(&self.layout.upload_dir)
            .await
            .map_err(io_error("creating upload directory"))?;
        tokio::fs::copy(source, &storage_path)
            .await
            .map_err(io_error(format!("storing upload at {}", storage_path.display())))?;

        let input = NewVideo {
            id,
            filename,
            storage_path: storage_path.clone(),
            size_bytes: size as i64,
        };
        match self.store.create_video(input).await {
            Ok(video) => {
                tracing::info!(video_id = %video.id, filename = %video.filename, size_bytes = size, "Video uploaded");
                Ok(video)
            }
            Err(e) => {
                if let Err(cleanup) = remove_file_if_exists(&storage_path).await {
                    tracing::warn!(path = %storage_path.display(), error = %cleanup, "Failed to remove orphaned upload");
                }
                Err(e.into())
            }
        }
    }

    pub async fn status(&self, id: VideoId) -> Result<StatusReport, ServiceError> {
        Ok(self.video(id).await?.status_report())
    }

    /// Full results of a completed video.
    pub async fn results(&self, id: VideoId) -> Result<VideoResults, ServiceError> {
        let video = self.video(id).await?;
        video.ensure_completed()?;
        let objects = self.store.detected_objects(id).await?;
        let texts = self.store.extracted_texts(id).await?;
        Ok(VideoResults::build(&video, objects, texts)?)
    }

    /// Render one export and write it to the exports directory.
    pub async fn export(
        &self,
        id: VideoId,
        format: ExportFormat,
        now: Timestamp,
    ) -> Result<ExportArtifact, ServiceError> {
        let doc = self.document(id, now).await?;
        self.write_export(&doc, format).await
    }

    /// Write every export format from one snapshot of the results.
    pub async fn export_all(&self, id: VideoId, now: Timestamp) -> Result<Vec<ExportArtifact>, ServiceError> {
        let doc = self.document(id, now).await?;
        let mut artifacts = Vec::with_capacity(ExportFormat::ALL.len());
        for format in ExportFormat::ALL {
            artifacts.push(self.write_export(&doc, format).await?);
        }
        Ok(artifacts)
    }

    /// Delete a video record, its results, its source file and frames.
    /// Export artifacts are left in place.
    pub async fn delete(&self, id: VideoId) -> Result<DeleteReport, ServiceError> {
        let video = self.store.delete_video(id).await?;

        let removed_source = remove_file_if_exists(&video.storage_path)
            .await
            .map_err(io_error(format!("removing {}", video.storage_path.display())))?;
        let removed_frames = self
            .layout
            .remove_frames(id)
            .await
            .map_err(io_error("removing frames"))?;

        tracing::info!(video_id = %id, removed_source, removed_frames, "Video deleted");
        Ok(DeleteReport {
            video,
            removed_source,
            removed_frames,
        })
    }

    pub async fn list(&self, query: &VideoListQuery) -> Result<Vec<Video>, ServiceError> {
        Ok(self.store.list_videos(query).await?)
    }

    async fn video(&self, id: VideoId) -> Result<Video, ServiceError> {
        self.store
            .find_video(id)
            .await?
            .ok_or_else(|| CoreError::video_not_found(id).into())
    }

    async fn document(&self, id: VideoId, now: Timestamp) -> Result<ExportDocument, ServiceError> {
        let video = self.video(id).await?;
        video.ensure_completed()?;
        let objects = self.store.detected_objects(id).await?;
        let texts = self.store.extracted_texts(id).await?;
        ExportDocument::new(video, objects, texts, now).map_err(|e| CoreError::from(e).into())
    }

    async fn write_export(
        &self,
        doc: &ExportDocument,
        format: ExportFormat,
    ) -> Result<ExportArtifact, ServiceError> {
        let bytes = export::render(format, doc).map_err(CoreError::from)?;
        let path = self.layout.export_path(&doc.file_name(format));
        tokio::fs::create_dir_all(&self.layout.exports_dir)
            .await
            .map_err(io_error("creating exports directory"))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(io_error(format!("writing {}", path.display())))?;

        tracing::info!(video_id = %doc.video.id, format = %format, path = %path.display(), "Export written");
        Ok(ExportArtifact {
            format,
            path,
            size_bytes: bytes.len(),
        })
    }
}
