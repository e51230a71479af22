// Ingestion pipeline tests without the HTTP layer

mod common;

use common::*;
use sightline_server::history::{HistoryStore, MemoryHistoryStore};
use sightline_server::upload::StagedUpload;
use sightline_server::{DetectionIngestor, IngestError, StoreError};
use std::sync::Arc;

#[tokio::test]
async fn test_ingest_saves_and_discards() {
    let dir = tempfile::tempdir().unwrap();
    let detector = Arc::new(FakeDetector::cats_and_dog());
    let history = Arc::new(MemoryHistoryStore::new());
    let ingestor = DetectionIngestor::new(detector.clone(), Some(Arc::new(FakeArchive)), history.clone());
    assert!(ingestor.archival_enabled());

    let upload = StagedUpload::write(dir.path(), Some("kitchen.jpg"), &sample_jpeg()).await.unwrap();
    let staged_path = upload.path().to_path_buf();
    let filename = upload.filename().to_string();

    let result = ingestor.ingest(upload).await.unwrap();
    assert_eq!(result.filename, filename);
    assert_eq!(result.total_objects, 3);
    assert_eq!(result.objects.len(), 3);
    assert!(result.image_url.as_deref().unwrap().ends_with(&filename));
    assert!(!staged_path.exists());

    let id = result.id.clone().unwrap();
    let stored = history.get_by_id(&id).await.unwrap();
    assert_eq!(stored, result);
}

#[tokio::test]
async fn test_ingest_without_archive() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(MemoryHistoryStore::new());
    let ingestor = DetectionIngestor::new(Arc::new(FakeDetector::empty()), None, history.clone());
    assert!(!ingestor.archival_enabled());

    let upload = StagedUpload::write(dir.path(), None, &sample_jpeg()).await.unwrap();
    let result = ingestor.ingest(upload).await.unwrap();

    assert!(result.image_url.is_none());
    assert!(result.filename.ends_with("-frame.jpg"));
    assert_eq!(result.total_objects, 0);
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_detection_error_fails_and_discards() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(MemoryHistoryStore::new());
    let ingestor = DetectionIngestor::new(Arc::new(FailingDetector), Some(Arc::new(FakeArchive)), history.clone());

    let upload = StagedUpload::write(dir.path(), Some("x.jpg"), b"not really a jpeg").await.unwrap();
    let staged_path = upload.path().to_path_buf();

    let err = ingestor.ingest(upload).await.unwrap_err();
    assert!(matches!(err, IngestError::Detection(_)));
    assert!(!err.is_client_error());
    assert!(!staged_path.exists());
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_store_failure_keeps_result() {
    let dir = tempfile::tempdir().unwrap();
    let ingestor = DetectionIngestor::new(
        Arc::new(FakeDetector::cats_and_dog()),
        Some(Arc::new(FailingArchive)),
        Arc::new(BrokenStore(StoreError::PermissionDenied("rules".into()))),
    );

    let upload = StagedUpload::write(dir.path(), Some("x.jpg"), &sample_jpeg()).await.unwrap();
    let result = ingestor.ingest(upload).await.unwrap();

    assert!(result.id.is_none());
    assert!(result.image_url.is_none());
    assert_eq!(result.total_objects, 3);
}

#[tokio::test]
async fn test_dropped_upload_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let upload = StagedUpload::write(dir.path(), Some("../../etc/passwd"), b"data").await.unwrap();
    let path = upload.path().to_path_buf();

    assert_eq!(path.parent().unwrap(), dir.path());
    assert!(upload.filename().ends_with("-passwd"));
    assert!(path.exists());

    drop(upload);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_interrupted_write_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let reader = tokio_test::io::Builder::new()
        .read(b"\xFF\xD8\xFF partial frame")
        .read_error(std::io::Error::new(std::io::ErrorKind::Other, "device full"))
        .build();

    let err = StagedUpload::write_from(dir.path(), Some("x.jpg"), reader).await.unwrap_err();
    assert!(matches!(err, IngestError::Staging(_)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
