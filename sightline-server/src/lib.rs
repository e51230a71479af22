pub mod error;
pub mod auth;
pub mod detector;
pub mod archive;
pub mod history;
pub mod upload;
pub mod ingest;
pub mod http;

pub use error::{ArchiveError, AuthError, DetectorError, IngestError, StoreError};
pub use auth::GoogleAuth;
pub use detector::{GoogleVisionDetector, ObjectDetector};
pub use archive::{GcsArchive, ObjectArchive};
pub use history::{HistoryStore, build_history_store};
pub use ingest::DetectionIngestor;
pub use http::{ApiState, create_router};
