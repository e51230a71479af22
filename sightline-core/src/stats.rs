//! Summary statistics derived from a held detection history

use crate::detection::DetectionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionStats {
    pub total_detections: usize,
    pub total_objects: usize,
    pub most_detected_object: Option<String>,
    /// Rounded to one decimal place; `0.0` for an empty history.
    pub average_objects_per_detection: f64,
}

impl DetectionStats {
    /// Recompute from scratch over `history`. Ties for the most frequent
    /// label go to the label encountered first in iteration order.
    pub fn from_history<'a, I>(history: I) -> Self
    where
        I: IntoIterator<Item = &'a DetectionResult>,
    {
        let mut total_detections = 0usize;
        let mut total_objects = 0usize;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut first_seen: Vec<&str> = Vec::new();

        for detection in history {
            total_detections += 1;
            total_objects += detection.objects.len();
            for object in &detection.objects {
                let count = counts.entry(object.name.as_str()).or_insert(0);
                if *count == 0 {
                    first_seen.push(object.name.as_str());
                }
                *count += 1;
            }
        }

        let mut most_detected_object: Option<(&str, usize)> = None;
        for name in first_seen {
            let count = counts[name];
            match most_detected_object {
                Some((_, best)) if count <= best => {}
                _ => most_detected_object = Some((name, count)),
            }
        }

        let average_objects_per_detection = if total_detections > 0 {
            ((total_objects as f64 / total_detections as f64) * 10.0).round() / 10.0
        } else {
            0.0
        };

        Self {
            total_detections,
            total_objects,
            most_detected_object: most_detected_object.map(|(name, _)| name.to_string()),
            average_objects_per_detection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectedObject;
    use chrono::Utc;

    fn detection(labels: &[&str]) -> DetectionResult {
        let objects = labels
            .iter()
            .map(|name| DetectedObject::new(*name, 0.9, vec![]))
            .collect();
        DetectionResult::new("frame.jpg", Utc::now(), objects)
    }

    #[test]
    fn test_empty_history() {
        let empty: Vec<DetectionResult> = Vec::new();
        let stats = DetectionStats::from_history(&empty);
        assert_eq!(stats, DetectionStats::default());
        assert!(stats.most_detected_object.is_none());
    }

    #[test]
    fn test_cat_dog_example() {
        let history = vec![detection(&["cat", "dog"]), detection(&["cat"])];
        let stats = DetectionStats::from_history(&history);
        assert_eq!(stats.total_detections, 2);
        assert_eq!(stats.total_objects, 3);
        assert_eq!(stats.most_detected_object.as_deref(), Some("cat"));
        assert_eq!(stats.average_objects_per_detection, 1.5);
    }

    #[test]
    fn test_tie_goes_to_first_encountered() {
        let history = vec![detection(&["dog", "cat"]), detection(&["cat", "dog"])];
        let stats = DetectionStats::from_history(&history);
        assert_eq!(stats.most_detected_object.as_deref(), Some("dog"));
    }

    #[test]
    fn test_average_rounds_to_one_decimal() {
        let history = vec![detection(&["a"]), detection(&["a", "b"]), detection(&[])];
        let stats = DetectionStats::from_history(&history);
        assert_eq!(stats.average_objects_per_detection, 1.0);

        let history = vec![detection(&["a", "b"]), detection(&["a", "b"]), detection(&["a"])];
        let stats = DetectionStats::from_history(&history);
        assert_eq!(stats.average_objects_per_detection, 1.7);
    }

    #[test]
    fn test_serialized_names() {
        let history = vec![detection(&["cup"])];
        let value = serde_json::to_value(DetectionStats::from_history(&history)).unwrap();
        assert_eq!(value["mostDetectedObject"], "cup");
        assert_eq!(value["averageObjectsPerDetection"], 1.0);
    }
}
