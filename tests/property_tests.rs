// Property-based tests for detection records, history and statistics

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use sightline_core::{round_confidence, DetectedObject, DetectionResult, DetectionStats, RecentHistory};

fn label() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["cat", "dog", "person", "cup", "car"]).prop_map(str::to_string)
}

fn detection() -> impl Strategy<Value = DetectionResult> {
    (
        prop::collection::vec((label(), 0.0f64..=1.0), 0..8),
        0i64..1_000_000,
    )
        .prop_map(|(objects, secs)| {
            let objects = objects
                .into_iter()
                .map(|(name, score)| DetectedObject::new(name, score, vec![]))
                .collect();
            DetectionResult::new("frame.jpg", Utc.timestamp_opt(secs, 0).unwrap(), objects)
        })
}

proptest! {
    #[test]
    fn prop_confidence_is_two_decimal_in_unit_range(score in -10.0f64..10.0) {
        let rounded = round_confidence(score);
        prop_assert!((0.0..=1.0).contains(&rounded));
        let scaled = rounded * 100.0;
        prop_assert!((scaled - scaled.round()).abs() < 1e-9);
        if (0.0..=1.0).contains(&score) {
            prop_assert!((rounded - score).abs() <= 0.005 + 1e-9);
        }
    }

    #[test]
    fn prop_new_result_is_valid(result in detection()) {
        prop_assert_eq!(result.total_objects, result.objects.len());
        prop_assert!(result.validate().is_ok());
        prop_assert!(!result.is_persisted());
        prop_assert_eq!(result.short_id(), "New");
    }

    #[test]
    fn prop_history_is_capped_newest_first(
        items in prop::collection::vec(detection(), 0..30),
        capacity in 1usize..15,
    ) {
        let mut history = RecentHistory::new(capacity);
        for item in &items {
            history.push(item.clone());
        }

        prop_assert_eq!(history.len(), items.len().min(capacity));
        let expected: Vec<_> = items.iter().rev().take(capacity).cloned().collect();
        prop_assert_eq!(history.to_vec(), expected);
        prop_assert_eq!(history.latest(), items.last());
    }

    #[test]
    fn prop_stats_match_history(items in prop::collection::vec(detection(), 0..12)) {
        let stats = DetectionStats::from_history(items.iter());
        let total_objects: usize = items.iter().map(|d| d.objects.len()).sum();

        prop_assert_eq!(stats.total_detections, items.len());
        prop_assert_eq!(stats.total_objects, total_objects);

        if items.is_empty() {
            prop_assert_eq!(stats.average_objects_per_detection, 0.0);
        } else {
            let exact = total_objects as f64 / items.len() as f64;
            prop_assert!((stats.average_objects_per_detection - exact).abs() <= 0.05 + 1e-9);
        }

        match &stats.most_detected_object {
            None => prop_assert_eq!(total_objects, 0),
            Some(winner) => {
                let count = |name: &str| items
                    .iter()
                    .flat_map(|d| d.objects.iter())
                    .filter(|o| o.name == name)
                    .count();
                let best = count(winner.as_str());
                for object in items.iter().flat_map(|d| d.objects.iter()) {
                    prop_assert!(count(object.name.as_str()) <= best);
                }
                // Ties go to the label seen first.
                let first_with_best = items
                    .iter()
                    .flat_map(|d| d.objects.iter())
                    .find(|o| count(o.name.as_str()) == best)
                    .map(|o| o.name.clone());
                prop_assert_eq!(first_with_best.as_deref(), Some(winner.as_str()));
            }
        }
    }

    #[test]
    fn prop_stats_are_a_pure_function(items in prop::collection::vec(detection(), 0..12)) {
        let mut history = RecentHistory::new(10);
        history.replace(items.clone());
        let held: Vec<_> = items.into_iter().take(10).collect();
        prop_assert_eq!(history.stats(), DetectionStats::from_history(held.iter()));
    }
}
