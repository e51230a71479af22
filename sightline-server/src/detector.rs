//! Object-localization client

use crate::auth::GoogleAuth;
use crate::error::DetectorError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sightline_core::config::{GoogleCloudConfig, VisionServiceConfig};
use sightline_core::{DetectedObject, Vertex};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Labels objects in a stored image. Implementations must be safe to share
/// across concurrent requests.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Returns objects in service order; confidences are already rounded.
    async fn detect(&self, image_path: &Path) -> Result<Vec<DetectedObject>, DetectorError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    localized_object_annotations: Vec<LocalizedObjectAnnotation>,
    error: Option<ServiceStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalizedObjectAnnotation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: f64,
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundingPoly {
    #[serde(default)]
    normalized_vertices: Vec<Vertex>,
}

#[derive(Debug, Deserialize)]
struct ServiceStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Google Cloud Vision `images:annotate` with `OBJECT_LOCALIZATION`.
pub struct GoogleVisionDetector {
    client: Client,
    endpoint: String,
    auth: Arc<GoogleAuth>,
    project_id: Option<String>,
    max_results: Option<u32>,
}

impl GoogleVisionDetector {
    pub fn new(
        vision: &VisionServiceConfig,
        google: &GoogleCloudConfig,
        auth: Arc<GoogleAuth>,
    ) -> Result<Self, DetectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(vision.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: vision.endpoint.trim_end_matches('/').to_string(),
            auth,
            project_id: google.project_id.clone(),
            max_results: vision.max_results,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.auth.is_configured()
    }

    fn request_body(&self, image: &[u8]) -> serde_json::Value {
        let mut feature = json!({ "type": "OBJECT_LOCALIZATION" });
        if let Some(max) = self.max_results {
            feature["maxResults"] = json!(max);
        }

        json!({
            "requests": [{
                "image": { "content": base64::encode(image) },
                "features": [feature],
            }]
        })
    }

    /// Convert an `images:annotate` body into detected objects.
    pub fn parse_response(body: &str) -> Result<Vec<DetectedObject>, DetectorError> {
        let parsed: AnnotateResponse = serde_json::from_str(body)
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;

        let first = match parsed.responses.into_iter().next() {
            Some(first) => first,
            None => return Ok(Vec::new()),
        };

        if let Some(status) = first.error {
            if status.code != 0 {
                return Err(DetectorError::Rpc {
                    code: status.code,
                    message: status.message,
                });
            }
        }

        Ok(first
            .localized_object_annotations
            .into_iter()
            .map(|annotation| {
                let vertices = annotation
                    .bounding_poly
                    .map(|poly| {
                        poly.normalized_vertices
                            .into_iter()
                            .map(|v| Vertex::normalized(v.x, v.y))
                            .collect()
                    })
                    .unwrap_or_default();
                DetectedObject::new(annotation.name, annotation.score, vertices)
            })
            .collect())
    }
}

#[async_trait]
impl ObjectDetector for GoogleVisionDetector {
    async fn detect(&self, image_path: &Path) -> Result<Vec<DetectedObject>, DetectorError> {
        if !self.has_credentials() {
            return Err(DetectorError::NotConfigured(
                "set GOOGLE_APPLICATION_CREDENTIALS, GOOGLE_API_KEY or GOOGLE_OAUTH_ACCESS_TOKEN".to_string(),
            ));
        }

        let image = tokio::fs::read(image_path).await?;
        let body = self.request_body(&image);

        let url = format!("{}/images:annotate", self.endpoint);
        let mut request = self.auth.authorize(self.client.post(&url).json(&body)).await?;
        if let Some(project) = &self.project_id {
            request = request.header("x-goog-user-project", project);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(DetectorError::Service {
                status: status.as_u16(),
                message: text,
            });
        }

        let objects = Self::parse_response(&text)?;
        debug!("Detection service returned {} object(s) for {}", objects.len(), image_path.display());
        Ok(objects)
    }
}
