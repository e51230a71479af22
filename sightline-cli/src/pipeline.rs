//! One capture cycle: frame, encode, upload, apply

use crate::client::VisionClient;
use crate::dashboard::{ApiStatus, CaptureStatus, Dashboard};
use crate::error::ClientError;
use crate::frame::{FrameEncoder, FrameSource};
use parking_lot::Mutex;
use sightline_core::DetectionResult;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum CycleOutcome {
    /// No frame was available; nothing was sent.
    Skipped,
    Detected(DetectionResult),
    Failed(ClientError),
}

/// Shared by the auto-capture loop and manual snapshots. Results are
/// applied to the dashboard in arrival order.
#[derive(Clone)]
pub struct CapturePipeline {
    source: Arc<dyn FrameSource>,
    encoder: FrameEncoder,
    client: VisionClient,
    dashboard: Arc<Mutex<Dashboard>>,
}

impl CapturePipeline {
    pub fn new(
        source: Arc<dyn FrameSource>,
        encoder: FrameEncoder,
        client: VisionClient,
        dashboard: Arc<Mutex<Dashboard>>,
    ) -> Self {
        Self {
            source,
            encoder,
            client,
            dashboard,
        }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        let previous = {
            let mut dashboard = self.dashboard.lock();
            let previous = dashboard.capture_status();
            dashboard.set_capture_status(CaptureStatus::Capturing);
            previous
        };

        let frame = match self.encoder.capture(self.source.as_ref()) {
            Some(frame) => frame,
            None => {
                debug!("No frame available from {}; skipping cycle", self.source.describe());
                self.dashboard.lock().set_capture_status(previous);
                return CycleOutcome::Skipped;
            }
        };

        self.dashboard.lock().set_capture_status(CaptureStatus::Processing);
        debug!("Uploading {} ({} bytes)", frame.file_name, frame.bytes.len());

        match self.client.detect(frame).await {
            Ok(result) => {
                info!(
                    "Detected {} object(s), id {}",
                    result.total_objects,
                    result.id.as_deref().unwrap_or("unsaved")
                );
                self.dashboard.lock().apply_detection(result.clone(), Instant::now());
                CycleOutcome::Detected(result)
            }
            Err(e) => {
                warn!("Capture error: {}", e);
                self.dashboard
                    .lock()
                    .report_error(format!("Capture failed: {}", e), Instant::now());
                CycleOutcome::Failed(e)
            }
        }
    }

    /// Refresh the API status from the health endpoint.
    pub async fn check_health(&self) -> ApiStatus {
        self.dashboard.lock().set_api_status(ApiStatus::Checking);
        let status = match self.client.health_check().await {
            Ok(_) => ApiStatus::Healthy,
            Err(e) => {
                warn!("Health check failed: {}", e);
                ApiStatus::Error
            }
        };
        self.dashboard.lock().set_api_status(status);
        status
    }

    /// Seed the dashboard with the server's most recent detections.
    pub async fn load_recent(&self, limit: usize) -> Result<usize, ClientError> {
        let envelope = self.client.list_recent(limit).await?;
        let items = envelope.data.unwrap_or_default();
        let count = items.len();
        self.dashboard.lock().load_history(items);
        Ok(count)
    }
}
