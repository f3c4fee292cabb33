mod common;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use v2t_core::error::CoreError;
use v2t_core::export::ExportFormat;
use v2t_core::status::VideoStatus;
use v2t_core::types::new_video_id;
use v2t_db::models::video::VideoListQuery;
use v2t_pipeline::store::VideoStore;
use v2t_worker::service::ServiceError;

use common::Env;

fn precondition(err: &ServiceError) -> bool {
    matches!(err.core(), Some(CoreError::Precondition(_)))
}

#[tokio::test]
async fn upload_is_stored_under_its_id() {
    let env = Env::new().await;
    let source = env.source_file("clip.MP4").await;

    let video = env.service.register_upload(&source, None).await.unwrap();

    assert_eq!(video.status, VideoStatus::Uploaded);
    assert_eq!(video.filename, "clip.MP4");
    assert_eq!(
        video.storage_path,
        env.layout.upload_dir.join(format!("{}.mp4", video.id))
    );
    assert!(video.storage_path.exists());
    assert!(source.exists());

    let report = env.service.status(video.id).await.unwrap();
    assert_eq!(report.progress, 0);
    assert_eq!(report.message, "Video uploaded, waiting to be processed");
}

#[tokio::test]
async fn rejected_upload_stores_nothing() {
    let env = Env::new().await;
    let source = env.source_file("notes.txt").await;

    let err = env.service.register_upload(&source, None).await.unwrap_err();
    assert_matches!(err.core(), Some(CoreError::Validation(_)));

    let mut uploads = tokio::fs::read_dir(&env.layout.upload_dir).await.unwrap();
    assert!(uploads.next_entry().await.unwrap().is_none());
    assert!(env.service.list(&VideoListQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn display_name_drives_validation() {
    let env = Env::new().await;
    let source = env.source_file("upload.bin").await;

    let video = env
        .service
        .register_upload(&source, Some("holiday.mkv"))
        .await
        .unwrap();
    assert_eq!(video.filename, "holiday.mkv");
    assert_eq!(video.storage_path.extension().unwrap(), "mkv");
}

#[tokio::test]
async fn unknown_video_is_not_found() {
    let env = Env::new().await;
    let err = env.service.status(new_video_id()).await.unwrap_err();
    assert_matches!(err.core(), Some(CoreError::NotFound { .. }));
}

#[tokio::test]
async fn results_and_exports_wait_for_completion() {
    let env = Env::new().await;
    let source = env.source_file("clip.mp4").await;
    let video = env.service.register_upload(&source, None).await.unwrap();

    assert!(precondition(&env.service.results(video.id).await.unwrap_err()));
    let err = env
        .service
        .export(video.id, ExportFormat::Pdf, Utc::now())
        .await
        .unwrap_err();
    assert!(precondition(&err));
    assert!(precondition(&env.service.export_all(video.id, Utc::now()).await.unwrap_err()));
    assert!(env.exported_files().await.is_empty());
}

#[tokio::test]
async fn completed_video_exports_every_format() {
    let env = Env::new().await;
    let source = env.source_file("street.mp4").await;
    let video = env.service.register_upload(&source, None).await.unwrap();
    env.process(video.id, video.storage_path.clone()).await;

    let results = env.service.results(video.id).await.unwrap();
    assert_eq!(results.status, VideoStatus::Completed);
    assert_eq!(results.detected_objects.len(), 3);
    assert_eq!(results.extracted_texts.len(), 3);
    assert_eq!(results.extracted_texts[0].text, "Main St");
    assert_eq!(results.total_frames, 3);

    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
    let artifacts = env.service.export_all(video.id, now).await.unwrap();
    let formats: Vec<ExportFormat> = artifacts.iter().map(|a| a.format).collect();
    assert_eq!(formats, ExportFormat::ALL.to_vec());
    assert!(artifacts.iter().all(|a| a.size_bytes > 0));

    let expected: Vec<String> = ["csv", "json", "pdf", "txt"]
        .iter()
        .map(|ext| format!("video_{}_results_20250301_123000.{ext}", video.id))
        .collect();
    assert_eq!(env.exported_files().await, expected);

    let json_path = artifacts
        .iter()
        .find(|a| a.format == ExportFormat::Json)
        .map(|a| a.path.clone())
        .unwrap();
    let parsed: serde_json::Value =
        serde_json::from_slice(&tokio::fs::read(json_path).await.unwrap()).unwrap();
    assert_eq!(parsed["summary"]["total_objects"], 3);
    assert_eq!(parsed["narrative"]["text"], "Main St");
}

#[tokio::test]
async fn delete_removes_files_but_keeps_exports() {
    let env = Env::new().await;
    let source = env.source_file("street.mp4").await;
    let video = env.service.register_upload(&source, None).await.unwrap();
    env.process(video.id, video.storage_path.clone()).await;
    env.service
        .export(video.id, ExportFormat::Text, Utc::now())
        .await
        .unwrap();
    assert!(env.layout.frames_dir_for(video.id).exists());

    let report = env.service.delete(video.id).await.unwrap();
    assert!(report.removed_source);
    assert!(report.removed_frames);
    assert!(!video.storage_path.exists());
    assert!(!env.layout.frames_dir_for(video.id).exists());
    assert_eq!(env.exported_files().await.len(), 1);

    let err = env.service.status(video.id).await.unwrap_err();
    assert_matches!(err.core(), Some(CoreError::NotFound { .. }));
    assert!(env.store.detected_objects(video.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn processing_video_cannot_be_deleted() {
    let env = Env::new().await;
    let source = env.source_file("street.mp4").await;
    let video = env.service.register_upload(&source, None).await.unwrap();
    env.store.begin_processing(video.id, "busy-worker").await.unwrap();

    let err = env.service.delete(video.id).await.unwrap_err();
    assert_matches!(err.core(), Some(CoreError::Conflict(_)));
    assert!(video.storage_path.exists());
}

#[tokio::test]
async fn list_filters_by_status() {
    let env = Env::new().await;
    let first = env
        .service
        .register_upload(&env.source_file("a.mp4").await, None)
        .await
        .unwrap();
    env.service
        .register_upload(&env.source_file("b.mp4").await, None)
        .await
        .unwrap();
    env.process(first.id, first.storage_path.clone()).await;

    let completed = env
        .service
        .list(&VideoListQuery {
            status: Some(VideoStatus::Completed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, first.id);
    assert_eq!(env.service.list(&VideoListQuery::default()).await.unwrap().len(), 2);
}
