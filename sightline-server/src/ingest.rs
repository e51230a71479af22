//! Detection ingestion: detect, archive, persist, clean up

use crate::archive::ObjectArchive;
use crate::detector::ObjectDetector;
use crate::error::{IngestError, StoreError};
use crate::history::HistoryStore;
use crate::upload::StagedUpload;
use sightline_core::DetectionResult;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handles one uploaded image end to end. Only a detection failure fails
/// the request; archive and persistence failures degrade the result.
#[derive(Clone)]
pub struct DetectionIngestor {
    detector: Arc<dyn ObjectDetector>,
    archive: Option<Arc<dyn ObjectArchive>>,
    history: Arc<dyn HistoryStore>,
}

impl DetectionIngestor {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        archive: Option<Arc<dyn ObjectArchive>>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            detector,
            archive,
            history,
        }
    }

    pub fn archival_enabled(&self) -> bool {
        self.archive.is_some()
    }

    /// Process a staged upload. The staged file is deleted on every path.
    pub async fn ingest(&self, upload: StagedUpload) -> Result<DetectionResult, IngestError> {
        let outcome = self.process(&upload).await;
        upload.discard().await;
        outcome
    }

    async fn process(&self, upload: &StagedUpload) -> Result<DetectionResult, IngestError> {
        let objects = match self.detector.detect(upload.path()).await {
            Ok(objects) => objects,
            Err(e) => {
                error!("Vision API error for {}: {}", upload.filename(), e);
                return Err(e.into());
            }
        };

        let mut result = DetectionResult::new(upload.filename(), upload.received_at(), objects);

        if let Some(archive) = &self.archive {
            match archive.put(upload.path(), upload.filename()).await {
                Ok(url) => result.image_url = Some(url),
                Err(e) => warn!("Cloud Storage upload failed: {}", e),
            }
        }

        match self.history.append(&result).await {
            Ok(id) => {
                info!("Saved detection {} ({} object(s))", id, result.total_objects);
                result.id = Some(id);
            }
            Err(StoreError::Unavailable(msg)) => {
                warn!("History store unavailable, detection not saved: {}", msg);
                debug!(result = ?result, "Unsaved detection result");
            }
            Err(e) => {
                error!("History store save failed: {}", e);
                debug!(result = ?result, "Unsaved detection result");
            }
        }

        Ok(result)
    }
}
