//! HTTP client for the detection server

use crate::error::ClientError;
use crate::frame::EncodedFrame;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use sightline_core::config::CaptureConfig;
use sightline_core::{ApiResponse, DetectionResult, HealthReport};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct VisionClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

impl VisionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!("unsupported scheme '{}'", base_url.scheme())));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self { http, base_url, timeout })
    }

    pub fn from_config(capture: &CaptureConfig) -> Result<Self, ClientError> {
        Self::new(&capture.server_url, Duration::from_secs(capture.request_timeout_secs))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
    }

    fn transport_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }

    /// Upload one frame as the multipart field `image`.
    pub async fn detect(&self, frame: EncodedFrame) -> Result<DetectionResult, ClientError> {
        let part = Part::bytes(frame.bytes)
            .file_name(frame.file_name)
            .mime_str(frame.mime)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let form = Form::new().part("image", part);

        let response = self
            .http
            .post(self.endpoint("/api/vision/detect")?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let envelope: ApiResponse<DetectionResult> = self.envelope(response).await?;
        if !envelope.success {
            return Err(ClientError::Rejected {
                status,
                message: envelope.error.unwrap_or_else(|| "Detection failed".to_string()),
                details: envelope.details,
            });
        }

        envelope
            .data
            .ok_or_else(|| ClientError::InvalidResponse("success response without data".to_string()))
    }

    pub async fn list_recent(&self, limit: usize) -> Result<ApiResponse<Vec<DetectionResult>>, ClientError> {
        let mut url = self.endpoint("/api/vision/detections")?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.get_envelope(url).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<ApiResponse<DetectionResult>, ClientError> {
        let mut url = self.endpoint("/api/vision/detections/")?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(id);
        self.get_envelope(url).await
    }

    pub async fn health_check(&self) -> Result<HealthReport, ClientError> {
        let response = self
            .http
            .get(self.endpoint("/api/vision/health")?)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message: format!("health check returned {}", status),
                details: None,
            });
        }
        response.json().await.map_err(|e| self.transport_error(e))
    }

    async fn get_envelope<T: DeserializeOwned>(&self, url: Url) -> Result<ApiResponse<T>, ClientError> {
        debug!("GET {}", url);
        let response = self.http.get(url).send().await.map_err(|e| self.transport_error(e))?;
        self.envelope(response).await
    }

    /// Decode the JSON envelope; non-2xx statuses become `Rejected`.
    async fn envelope<T: DeserializeOwned>(&self, response: Response) -> Result<ApiResponse<T>, ClientError> {
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let failure: Option<ApiResponse<serde_json::Value>> = serde_json::from_str(&text).ok();
            let (message, details) = match failure {
                Some(body) => (body.error, body.details),
                None => (None, None),
            };
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| format!("server returned {}", status)),
                details,
            });
        }

        serde_json::from_str(&text).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}
