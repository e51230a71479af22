//! Staging of multipart uploads on local disk

use crate::error::IngestError;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

const DEFAULT_UPLOAD_NAME: &str = "frame.jpg";

/// An uploaded image written to the upload directory. The file is removed
/// by [`StagedUpload::discard`], or on drop if that never ran.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    filename: String,
    received_at: DateTime<Utc>,
    removed: bool,
}

impl StagedUpload {
    pub async fn write(upload_dir: &Path, original_name: Option<&str>, data: &[u8]) -> Result<Self, IngestError> {
        Self::write_from(upload_dir, original_name, data).await
    }

    /// Stream `reader` into a new file. The guard exists before the first
    /// byte is written, so a failed write leaves nothing behind.
    pub async fn write_from<R>(upload_dir: &Path, original_name: Option<&str>, mut reader: R) -> Result<Self, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        let received_at = Utc::now();
        tokio::fs::create_dir_all(upload_dir).await?;

        let filename = format!(
            "{}-{}",
            Uuid::new_v4().simple(),
            sanitize_filename(original_name.unwrap_or(DEFAULT_UPLOAD_NAME))
        );
        let staged = Self {
            path: upload_dir.join(&filename),
            filename,
            received_at,
            removed: false,
        };

        let mut file = tokio::fs::File::create(&staged.path).await?;
        tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Server-assigned file name recorded on the detection result.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Best-effort removal; failures are logged only.
    pub async fn discard(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Error deleting local file {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Error deleting file after error {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Keep only characters safe in a file name; never empty.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        DEFAULT_UPLOAD_NAME.to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

fn multipart_error(err: MultipartError) -> IngestError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        IngestError::PayloadTooLarge(err.body_text())
    } else {
        IngestError::MalformedUpload(err.body_text())
    }
}

/// Read the `image` field and stage it. Other fields are ignored.
pub async fn stage_image(multipart: &mut Multipart, upload_dir: &Path) -> Result<StagedUpload, IngestError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Err(IngestError::NoFileProvided);
        }
        return StagedUpload::write(upload_dir, original_name.as_deref(), &data).await;
    }

    Err(IngestError::NoFileProvided)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("capture.jpg"), "capture.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\temp\\my frame.png"), "my_frame.png");
        assert_eq!(sanitize_filename(".."), "frame.jpg");
        assert_eq!(sanitize_filename(""), "frame.jpg");
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::write(dir.path(), Some("a.jpg"), b"data").await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert!(staged.filename().ends_with("-a.jpg"));
        staged.discard().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::write(dir.path(), None, b"data").await.unwrap();
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_discard_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::write(dir.path(), None, b"data").await.unwrap();
        std::fs::remove_file(staged.path()).unwrap();
        staged.discard().await;
    }
}
