//! Detection records produced by the ingestion pipeline

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Round a detection score to two decimal places, clamped into [0, 1].
pub fn round_confidence(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// A normalized polygon point; both coordinates lie in [0, 1].
///
/// The detection service omits a coordinate when it is zero, so missing
/// fields deserialize as `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Clamp a raw service coordinate pair into the unit square.
    pub fn normalized(x: f64, y: f64) -> Self {
        let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self { x: clamp(x), y: clamp(y) }
    }

    fn in_unit_square(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default)]
    pub vertices: Vec<Vertex>,
}

/// One labeled object returned by the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub name: String,
    pub confidence: f64,
    #[serde(default)]
    pub bounding_box: BoundingBox,
}

impl DetectedObject {
    /// Build an object from a raw service score; the score is rounded here.
    pub fn new(name: impl Into<String>, score: f64, vertices: Vec<Vertex>) -> Self {
        Self {
            name: name.into(),
            confidence: round_confidence(score),
            bounding_box: BoundingBox { vertices },
        }
    }
}

/// One record per processed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    /// Assigned by the history store; absent until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub filename: String,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    pub total_objects: usize,
    /// Present only when archival to object storage succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl DetectionResult {
    /// Create a transient, unpersisted result. `total_objects` always
    /// matches the object count.
    pub fn new(filename: impl Into<String>, timestamp: DateTime<Utc>, objects: Vec<DetectedObject>) -> Self {
        let total_objects = objects.len();
        Self {
            id: None,
            timestamp,
            filename: filename.into(),
            objects,
            total_objects,
            image_url: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Last six characters of the id, or `New` for unsaved results.
    pub fn short_id(&self) -> String {
        match &self.id {
            Some(id) => {
                let chars: Vec<char> = id.chars().collect();
                let start = chars.len().saturating_sub(6);
                chars[start..].iter().collect()
            }
            None => "New".to_string(),
        }
    }

    /// Check the record invariants before it crosses a store boundary.
    pub fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(Error::InvalidRecord("filename must not be empty".to_string()));
        }

        if self.total_objects != self.objects.len() {
            return Err(Error::InvalidRecord(format!(
                "totalObjects is {} but {} objects are present",
                self.total_objects,
                self.objects.len()
            )));
        }

        for object in &self.objects {
            let c = object.confidence;
            if !c.is_finite() || !(0.0..=1.0).contains(&c) {
                return Err(Error::InvalidRecord(format!(
                    "confidence {} of '{}' is outside [0, 1]",
                    c, object.name
                )));
            }
            if (round_confidence(c) - c).abs() > 1e-9 {
                return Err(Error::InvalidRecord(format!(
                    "confidence {} of '{}' is not rounded to 2 decimals",
                    c, object.name
                )));
            }
            if let Some(v) = object.bounding_box.vertices.iter().find(|v| !v.in_unit_square()) {
                return Err(Error::InvalidRecord(format!(
                    "vertex ({}, {}) of '{}' is not normalized",
                    v.x, v.y, object.name
                )));
            }
        }

        Ok(())
    }
}
