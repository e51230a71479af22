pub mod error;
pub mod detection;
pub mod envelope;
pub mod recent;
pub mod stats;
pub mod config;

pub use error::{Error, Result};
pub use detection::{BoundingBox, DetectedObject, DetectionResult, Vertex, round_confidence};
pub use envelope::{ApiResponse, HealthReport, ServiceDescriptor};
pub use recent::RecentHistory;
pub use stats::DetectionStats;
pub use config::{ConfigError, Environment, HistoryBackend, SightlineConfig};
