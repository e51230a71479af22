// Shared fakes and helpers for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use parking_lot::Mutex;
use serde_json::Value;
use sightline_core::config::Environment;
use sightline_core::{DetectedObject, DetectionResult, Vertex};
use sightline_server::archive::ObjectArchive;
use sightline_server::detector::ObjectDetector;
use sightline_server::history::{HistoryStore, MemoryHistoryStore};
use sightline_server::{create_router, ApiState, ArchiveError, DetectionIngestor, DetectorError, StoreError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const BOUNDARY: &str = "sightline-test-boundary";

/// Returns a fixed object list and remembers every image it was shown.
pub struct FakeDetector {
    objects: Vec<DetectedObject>,
    calls: AtomicUsize,
    seen: Mutex<Vec<PathBuf>>,
    delay: Option<Duration>,
}

impl FakeDetector {
    pub fn new(objects: Vec<DetectedObject>) -> Self {
        Self {
            objects,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn cats_and_dog() -> Self {
        Self::new(vec![
            DetectedObject::new("Cat", 0.9271, vec![Vertex::new(0.1, 0.2), Vertex::new(0.4, 0.6)]),
            DetectedObject::new("Cat", 0.7349, vec![]),
            DetectedObject::new("Dog", 0.555, vec![Vertex::new(0.5, 0.5)]),
        ])
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::cats_and_dog()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ObjectDetector for FakeDetector {
    async fn detect(&self, image_path: &Path) -> Result<Vec<DetectedObject>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(image_path.exists(), "staged file must exist while detecting");
        self.seen.lock().push(image_path.to_path_buf());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.objects.clone())
    }
}

pub struct FailingDetector;

#[async_trait]
impl ObjectDetector for FailingDetector {
    async fn detect(&self, _image_path: &Path) -> Result<Vec<DetectedObject>, DetectorError> {
        Err(DetectorError::Service {
            status: 429,
            message: "quota exceeded".to_string(),
        })
    }
}

pub struct PanickingDetector;

#[async_trait]
impl ObjectDetector for PanickingDetector {
    async fn detect(&self, _image_path: &Path) -> Result<Vec<DetectedObject>, DetectorError> {
        panic!("detector exploded");
    }
}

pub struct FakeArchive;

#[async_trait]
impl ObjectArchive for FakeArchive {
    async fn put(&self, local_path: &Path, filename: &str) -> Result<String, ArchiveError> {
        assert!(local_path.exists());
        Ok(format!("https://storage.googleapis.com/test-bucket/detections/1-{}", filename))
    }
}

pub struct FailingArchive;

#[async_trait]
impl ObjectArchive for FailingArchive {
    async fn put(&self, _local_path: &Path, _filename: &str) -> Result<String, ArchiveError> {
        Err(ArchiveError::Rejected {
            status: 403,
            message: "bucket is read-only".to_string(),
        })
    }
}

/// Fails every operation with the same error.
pub struct BrokenStore(pub StoreError);

#[async_trait]
impl HistoryStore for BrokenStore {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(self.0.clone())
    }

    async fn append(&self, _result: &DetectionResult) -> Result<String, StoreError> {
        Err(self.0.clone())
    }

    async fn list_recent(&self, _limit: usize) -> Result<Vec<DetectionResult>, StoreError> {
        Err(self.0.clone())
    }

    async fn get_by_id(&self, _id: &str) -> Result<DetectionResult, StoreError> {
        Err(self.0.clone())
    }

    async fn collection_exists(&self) -> Result<bool, StoreError> {
        Err(self.0.clone())
    }
}

pub struct TestServer {
    pub state: ApiState,
    pub upload_dir: tempfile::TempDir,
}

impl TestServer {
    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    /// Files left behind in the upload directory.
    pub fn leftover_uploads(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub fn test_server(
    detector: Arc<dyn ObjectDetector>,
    archive: Option<Arc<dyn ObjectArchive>>,
    history: Arc<dyn HistoryStore>,
    environment: Environment,
) -> TestServer {
    let upload_dir = tempfile::tempdir().unwrap();
    let ingestor = DetectionIngestor::new(detector, archive, history.clone());
    let state = ApiState {
        ingestor: Arc::new(ingestor),
        history,
        upload_dir: Arc::new(upload_dir.path().to_path_buf()),
        max_upload_bytes: 10 * 1024 * 1024,
        environment,
    };
    TestServer { state, upload_dir }
}

pub fn default_server(detector: Arc<dyn ObjectDetector>) -> TestServer {
    test_server(
        detector,
        None,
        Arc::new(MemoryHistoryStore::new()),
        Environment::Development,
    )
}

pub fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn detect_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/vision/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, filename, data)))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serve the router on an ephemeral local port.
pub async fn spawn(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn sample_jpeg() -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 8, image::Rgb([200, 30, 30])));
    sightline_cli::FrameEncoder::default().encode(&image).unwrap().bytes
}
