use std::time::Duration;
use thiserror::Error;

/// Upload client failures. Transport failures (timeout, network) are kept
/// apart from the server answering with a failure.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Rejected {
        status: u16,
        message: String,
        details: Option<String>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Timeout(_) | ClientError::Network(_))
    }

    /// HTTP status of an application-level failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum CaptureError {
    #[error("Capture interval must be positive")]
    InvalidInterval,
}
