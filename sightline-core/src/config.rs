// Configuration for the Sightline server and capture client

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Deployment environment; failure details are only exposed outside production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Which document store backs the detection history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    Firestore,
    #[default]
    Sled,
    Memory,
}

impl HistoryBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "firestore" => Some(HistoryBackend::Firestore),
            "sled" => Some(HistoryBackend::Sled),
            "memory" => Some(HistoryBackend::Memory),
            _ => None,
        }
    }
}

/// HTTP listener and upload staging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            upload_dir: PathBuf::from("./uploads"),
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
            environment: Environment::Development,
        }
    }
}

/// Credentials shared by every Google Cloud collaborator
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GoogleCloudConfig {
    pub project_id: Option<String>,
    /// Service-account JSON key; tokens minted from it are refreshed.
    pub credentials_file: Option<PathBuf>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionServiceConfig {
    pub endpoint: String,
    pub max_results: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for VisionServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1".to_string(),
            max_results: None,
            timeout_secs: 30,
        }
    }
}

/// Object storage archival; disabled when no bucket is set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub bucket: Option<String>,
    pub upload_endpoint: String,
    pub public_base_url: String,
    pub object_prefix: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            upload_endpoint: "https://storage.googleapis.com/upload/storage/v1".to_string(),
            public_base_url: "https://storage.googleapis.com".to_string(),
            object_prefix: "detections".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
    pub collection: String,
    pub data_dir: PathBuf,
    pub firestore_endpoint: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::Sled,
            collection: "detections".to_string(),
            data_dir: PathBuf::from("./data/history"),
            firestore_endpoint: "https://firestore.googleapis.com/v1".to_string(),
        }
    }
}

/// Client-side capture loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub server_url: String,
    pub interval_ms: u64,
    pub jpeg_quality: u8,
    pub request_timeout_secs: u64,
    pub history_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000".to_string(),
            interval_ms: 5000,
            jpeg_quality: 80,
            request_timeout_secs: 30,
            history_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SightlineConfig {
    pub server: ServerConfig,
    pub google: GoogleCloudConfig,
    pub vision: VisionServiceConfig,
    pub archive: ArchiveConfig,
    pub history: HistoryConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

impl SightlineConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        if path.contains("..") {
            return Err(ConfigError::IoError(format!(
                "Path traversal detected: '{}'",
                path
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string (JSON, TOML or YAML)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<SightlineConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<SightlineConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<SightlineConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// File (when given) or defaults, then environment overrides, then validation.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(host) = lookup("HOST") {
            self.server.bind_address = host;
        }
        if let Some(env) = lookup("SIGHTLINE_ENV").and_then(|e| Environment::parse(&e)) {
            self.server.environment = env;
        }
        if let Some(dir) = lookup("SIGHTLINE_UPLOAD_DIR") {
            self.server.upload_dir = PathBuf::from(dir);
        }

        if let Some(project) = non_empty(lookup("GOOGLE_CLOUD_PROJECT_ID")) {
            self.google.project_id = Some(project);
        }
        if let Some(path) = non_empty(lookup("GOOGLE_APPLICATION_CREDENTIALS")) {
            self.google.credentials_file = Some(PathBuf::from(path));
        }
        if let Some(key) = non_empty(lookup("GOOGLE_API_KEY")) {
            self.google.api_key = Some(key);
        }
        if let Some(token) = non_empty(lookup("GOOGLE_OAUTH_ACCESS_TOKEN")) {
            self.google.access_token = Some(token);
        }

        if let Some(bucket) = non_empty(lookup("CLOUD_STORAGE_BUCKET")) {
            self.archive.bucket = Some(bucket);
        }

        if let Some(collection) = non_empty(lookup("FIRESTORE_COLLECTION")) {
            self.history.collection = collection;
        }
        if let Some(backend) = lookup("SIGHTLINE_HISTORY_BACKEND").and_then(|b| HistoryBackend::parse(&b)) {
            self.history.backend = backend;
        }
        if let Some(dir) = lookup("SIGHTLINE_DATA_DIR") {
            self.history.data_dir = PathBuf::from(dir);
        }

        if let Some(url) = non_empty(lookup("SIGHTLINE_API_URL")) {
            self.capture.server_url = url;
        }
        if let Some(interval) = lookup("CAPTURE_INTERVAL_MS").and_then(|i| i.parse::<u64>().ok()) {
            self.capture.interval_ms = interval;
        }

        if let Some(level) = non_empty(lookup("SIGHTLINE_LOG_LEVEL")) {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError("server.port must be > 0".to_string()));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_upload_bytes must be > 0".to_string(),
            ));
        }

        let collection = self.history.collection.trim();
        if collection.is_empty() || collection.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "history.collection '{}' is not a valid collection name",
                self.history.collection
            )));
        }

        if self.history.backend == HistoryBackend::Firestore && self.google.project_id.is_none() {
            return Err(ConfigError::ValidationError(
                "the firestore history backend requires google.project_id".to_string(),
            ));
        }

        if self.capture.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "capture.interval_ms must be > 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(ConfigError::ValidationError(
                "capture.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.capture.history_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "capture.history_capacity must be > 0".to_string(),
            ));
        }

        if self.capture.request_timeout_secs == 0 || self.vision.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request timeouts must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
