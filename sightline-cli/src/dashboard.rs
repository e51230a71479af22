//! Client-side detection state and its terminal rendering

use sightline_core::{DetectionResult, DetectionStats, RecentHistory};
use std::fmt::Write;
use std::time::{Duration, Instant};

/// How long a capture error stays on screen.
pub const ERROR_DISPLAY: Duration = Duration::from_secs(3);
/// How long a detection notification stays on screen.
pub const NOTIFICATION_DISPLAY: Duration = Duration::from_secs(5);
/// How long `detection-complete` shows before an active loop resumes.
pub const COMPLETE_DISPLAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    Checking,
    Healthy,
    Error,
}

impl ApiStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ApiStatus::Checking => "checking",
            ApiStatus::Healthy => "healthy",
            ApiStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Idle,
    CapturingActive,
    Capturing,
    Processing,
    DetectionComplete,
    Error,
    Stopped,
}

impl CaptureStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CaptureStatus::Idle => "idle",
            CaptureStatus::CapturingActive => "capturing-active",
            CaptureStatus::Capturing => "capturing",
            CaptureStatus::Processing => "processing",
            CaptureStatus::DetectionComplete => "detection-complete",
            CaptureStatus::Error => "error",
            CaptureStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceLevel::High
        } else if confidence >= 0.6 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Notice {
    message: String,
    expires_at: Instant,
}

/// Latest result, bounded newest-first history and statistics derived from
/// it. Statistics are recomputed from the held history on every change.
#[derive(Debug, Clone)]
pub struct Dashboard {
    latest: Option<DetectionResult>,
    history: RecentHistory,
    stats: DetectionStats,
    api_status: ApiStatus,
    capture_status: CaptureStatus,
    capturing: bool,
    error: Option<Notice>,
    notification: Option<Notice>,
    complete_until: Option<Instant>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new(sightline_core::recent::DEFAULT_HISTORY_CAPACITY)
    }
}

impl Dashboard {
    pub fn new(capacity: usize) -> Self {
        Self {
            latest: None,
            history: RecentHistory::new(capacity),
            stats: DetectionStats::default(),
            api_status: ApiStatus::Checking,
            capture_status: CaptureStatus::Idle,
            capturing: false,
            error: None,
            notification: None,
            complete_until: None,
        }
    }

    pub fn latest(&self) -> Option<&DetectionResult> {
        self.latest.as_ref()
    }

    pub fn history(&self) -> &RecentHistory {
        &self.history
    }

    pub fn stats(&self) -> &DetectionStats {
        &self.stats
    }

    pub fn api_status(&self) -> ApiStatus {
        self.api_status
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.capture_status
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_ref().map(|n| n.message.as_str())
    }

    pub fn notification(&self) -> Option<&str> {
        self.notification.as_ref().map(|n| n.message.as_str())
    }

    pub fn set_api_status(&mut self, status: ApiStatus) {
        self.api_status = status;
    }

    pub fn set_capture_status(&mut self, status: CaptureStatus) {
        self.capture_status = status;
    }

    /// Toggle auto-capture mode.
    pub fn set_capturing(&mut self, capturing: bool) {
        self.capturing = capturing;
        self.capture_status = if capturing {
            CaptureStatus::CapturingActive
        } else {
            CaptureStatus::Stopped
        };
    }

    /// Replace the held history, e.g. with the server's recent list.
    pub fn load_history(&mut self, items: Vec<DetectionResult>) {
        self.history.replace(items);
        self.stats = self.history.stats();
    }

    /// Apply a detection as it arrives; arrival order wins.
    pub fn apply_detection(&mut self, result: DetectionResult, now: Instant) {
        self.notification = Some(Notice {
            message: format!("Detected {} object(s)!", result.total_objects),
            expires_at: now + NOTIFICATION_DISPLAY,
        });
        self.latest = Some(result.clone());
        self.history.push(result);
        self.stats = self.history.stats();
        self.capture_status = CaptureStatus::DetectionComplete;
        self.complete_until = Some(now + COMPLETE_DISPLAY);
    }

    /// Show a transient capture error.
    pub fn report_error(&mut self, message: impl Into<String>, now: Instant) {
        self.error = Some(Notice {
            message: message.into(),
            expires_at: now + ERROR_DISPLAY,
        });
        self.capture_status = CaptureStatus::Error;
    }

    /// Drop expired notices. An expired error or completion returns an
    /// active capture loop to `capturing-active`.
    pub fn expire(&mut self, now: Instant) {
        if self.complete_until.map_or(false, |until| now >= until) {
            self.complete_until = None;
            if self.capturing && self.capture_status == CaptureStatus::DetectionComplete {
                self.capture_status = CaptureStatus::CapturingActive;
            }
        }
        if self.error.as_ref().map_or(false, |n| now >= n.expires_at) {
            self.error = None;
            if self.capturing && self.capture_status == CaptureStatus::Error {
                self.capture_status = CaptureStatus::CapturingActive;
            }
        }
        if self.notification.as_ref().map_or(false, |n| now >= n.expires_at) {
            self.notification = None;
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Sightline");
        let _ = writeln!(
            out,
            "API: {:<9} Capture: {:<18} Mode: {}",
            self.api_status.label(),
            self.capture_status.label(),
            if self.capturing { "auto" } else { "manual" }
        );

        if let Some(error) = self.error() {
            let _ = writeln!(out, "! {}", error);
        }
        if let Some(notification) = self.notification() {
            let _ = writeln!(out, "* {}", notification);
        }

        let stats = &self.stats;
        let _ = writeln!(
            out,
            "Detections: {}  Objects: {}  Most detected: {}  Avg/detection: {:.1}",
            stats.total_detections,
            stats.total_objects,
            stats.most_detected_object.as_deref().unwrap_or("-"),
            stats.average_objects_per_detection
        );

        let _ = writeln!(out);
        if self.history.is_empty() {
            let _ = writeln!(out, "No detections yet");
        }
        for result in self.history.iter() {
            let _ = writeln!(
                out,
                "#{} {} {} object(s)",
                result.short_id(),
                result.timestamp.format("%Y-%m-%d %H:%M:%S"),
                result.total_objects
            );
            for object in &result.objects {
                let _ = writeln!(
                    out,
                    "    {:<20} {:>3.0}% {}",
                    object.name,
                    object.confidence * 100.0,
                    ConfidenceLevel::from_confidence(object.confidence).label()
                );
            }
        }
        out
    }
}
