//! Best-effort archival of uploaded images to object storage

use crate::auth::GoogleAuth;
use crate::error::ArchiveError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use sightline_core::config::ArchiveConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const CACHE_CONTROL: &str = "public, max-age=31536000";
const BOUNDARY: &str = "sightline-archive-boundary";

#[async_trait]
pub trait ObjectArchive: Send + Sync {
    /// Store the file and return its public URL.
    async fn put(&self, local_path: &Path, filename: &str) -> Result<String, ArchiveError>;
}

/// `{prefix}/{unix_millis}-{filename}`
pub fn object_name(prefix: &str, unix_millis: i64, filename: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}-{}", unix_millis, filename)
    } else {
        format!("{}/{}-{}", prefix, unix_millis, filename)
    }
}

pub fn public_url(base: &str, bucket: &str, object: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, object)
}

pub fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Google Cloud Storage JSON API upload.
pub struct GcsArchive {
    client: Client,
    bucket: String,
    upload_endpoint: String,
    public_base_url: String,
    prefix: String,
    auth: Arc<GoogleAuth>,
}

impl GcsArchive {
    pub fn new(bucket: impl Into<String>, archive: &ArchiveConfig, auth: Arc<GoogleAuth>) -> Result<Self, ArchiveError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            bucket: bucket.into(),
            upload_endpoint: archive.upload_endpoint.trim_end_matches('/').to_string(),
            public_base_url: archive.public_base_url.clone(),
            prefix: archive.object_prefix.clone(),
            auth,
        })
    }

    /// Archive built from configuration, or `None` when no bucket is set.
    pub fn from_config(archive: &ArchiveConfig, auth: Arc<GoogleAuth>) -> Result<Option<Self>, ArchiveError> {
        match archive.bucket.as_deref().map(str::trim) {
            Some(bucket) if !bucket.is_empty() => Ok(Some(Self::new(bucket, archive, auth)?)),
            _ => Ok(None),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `multipart/related` body carrying object metadata and media.
    fn related_body(object: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let metadata = json!({
            "name": object,
            "contentType": content_type,
            "cacheControl": CACHE_CONTROL,
        });

        let mut body = Vec::with_capacity(data.len() + 512);
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata.to_string().as_bytes());
        body.extend_from_slice(format!("\r\n--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }
}

#[async_trait]
impl ObjectArchive for GcsArchive {
    async fn put(&self, local_path: &Path, filename: &str) -> Result<String, ArchiveError> {
        let data = tokio::fs::read(local_path).await?;
        let object = object_name(&self.prefix, chrono::Utc::now().timestamp_millis(), filename);
        let content_type = content_type_for(filename);

        let url = format!(
            "{}/b/{}/o?uploadType=multipart",
            self.upload_endpoint,
            urlencoding::encode(&self.bucket)
        );

        let request = self
            .client
            .post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .body(Self::related_body(&object, content_type, &data));

        let response = self.auth.authorize(request).await?.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ArchiveError::Rejected { status, message });
        }

        Ok(public_url(&self.public_base_url, &self.bucket, &object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name() {
        assert_eq!(object_name("detections", 1700000000000, "a.jpg"), "detections/1700000000000-a.jpg");
        assert_eq!(object_name("/frames/", 5, "b.png"), "frames/5-b.png");
        assert_eq!(object_name("", 5, "b.png"), "5-b.png");
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            public_url("https://storage.googleapis.com", "my-bucket", "detections/1-a.jpg"),
            "https://storage.googleapis.com/my-bucket/detections/1-a.jpg"
        );
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("frame.PNG"), "image/png");
        assert_eq!(content_type_for("frame.jpg"), "image/jpeg");
        assert_eq!(content_type_for("frame"), "image/jpeg");
    }

    #[test]
    fn test_from_config_disabled_without_bucket() {
        let auth = Arc::new(GoogleAuth::none());
        let archive = GcsArchive::from_config(&ArchiveConfig::default(), auth.clone()).unwrap();
        assert!(archive.is_none());

        let config = ArchiveConfig {
            bucket: Some("frames".to_string()),
            ..ArchiveConfig::default()
        };
        let archive = GcsArchive::from_config(&config, auth).unwrap().unwrap();
        assert_eq!(archive.bucket(), "frames");
    }

    #[test]
    fn test_related_body_layout() {
        let body = GcsArchive::related_body("detections/1-a.jpg", "image/jpeg", b"JPEGDATA");
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--sightline-archive-boundary\r\n"));
        assert!(text.contains("\"cacheControl\":\"public, max-age=31536000\""));
        assert!(text.contains("JPEGDATA"));
        assert!(text.ends_with("--sightline-archive-boundary--\r\n"));
    }
}
