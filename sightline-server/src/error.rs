use axum::http::StatusCode;
use thiserror::Error;

/// Failures obtaining Google Cloud credentials.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to read credentials file {path}: {source}")]
    ReadKey {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Failures talking to the object-localization service. Always fatal to
/// the ingestion request.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Detection service is not configured: {0}")]
    NotConfigured(String),

    #[error("Detection service authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Detection request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Detection service returned {status}: {message}")]
    Service { status: u16, message: String },

    /// Per-image failure inside a successful response, carrying a
    /// `google.rpc.Code` rather than an HTTP status.
    #[error("Detection service rejected the image (rpc code {code}): {message}")]
    Rpc { code: i32, message: String },

    #[error("Invalid detection response: {0}")]
    InvalidResponse(String),
}

/// Failures archiving an image. Logged and swallowed by the ingestor.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Archive authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Object storage rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("History store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    Validation(String),

    #[error("History store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Stable code echoed to clients as `errorCode`.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "UNAVAILABLE",
            StoreError::InvalidQuery(_) => "INVALID_ARGUMENT",
            StoreError::PermissionDenied(_) => "PERMISSION_DENIED",
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Validation(_) => "FAILED_PRECONDITION",
            StoreError::Backend(_) => "INTERNAL",
        }
    }

    /// Status for list queries. A missing database is reported as an
    /// unavailable service, not as a missing resource.
    pub fn list_status(&self) -> StatusCode {
        match self {
            StoreError::Unavailable(_) | StoreError::NotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            StoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            StoreError::Validation(_) | StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Status for single-record lookups.
    pub fn lookup_status(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            other => other.list_status(),
        }
    }

    /// Client-facing summary; the underlying message goes into `details`.
    pub fn summary(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "Firestore service unavailable",
            StoreError::InvalidQuery(_) => "Invalid query parameters",
            StoreError::PermissionDenied(_) => "Permission denied to access Firestore",
            StoreError::NotFound(_) => "Firestore database or collection not found",
            StoreError::Validation(_) | StoreError::Backend(_) => "Failed to fetch detections",
        }
    }
}

impl From<sightline_core::Error> for StoreError {
    fn from(err: sightline_core::Error) -> Self {
        match err {
            sightline_core::Error::InvalidRecord(msg) => StoreError::Validation(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<AuthError> for StoreError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected { .. } => StoreError::PermissionDenied(err.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(e) => StoreError::Unavailable(e.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Ingestion failures that reach the HTTP caller. Archive and store
/// failures never appear here.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No image file uploaded")]
    NoFileProvided,

    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("Upload exceeds the size limit: {0}")]
    PayloadTooLarge(String),

    #[error("Failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Detection failed: {0}")]
    Detection(#[from] DetectorError),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::NoFileProvided | IngestError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            IngestError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::Staging(_) | IngestError::Detection(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}
