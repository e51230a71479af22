//! Bounded, newest-first display cache of detection results

use crate::detection::DetectionResult;
use crate::stats::DetectionStats;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Fixed-capacity history; index 0 is always the most recent result.
#[derive(Debug, Clone)]
pub struct RecentHistory {
    capacity: usize,
    items: VecDeque<DetectionResult>,
}

impl Default for RecentHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl RecentHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Prepend a result, dropping the oldest entry once full.
    pub fn push(&mut self, result: DetectionResult) {
        self.items.push_front(result);
        self.items.truncate(self.capacity);
    }

    /// Replace the held history with an already newest-first listing.
    pub fn replace(&mut self, items: Vec<DetectionResult>) {
        self.items = items.into_iter().take(self.capacity).collect();
    }

    pub fn latest(&self) -> Option<&DetectionResult> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectionResult> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<DetectionResult> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> DetectionStats {
        DetectionStats::from_history(self.items.iter())
    }
}
