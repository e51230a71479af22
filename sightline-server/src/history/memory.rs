use super::{check_id, check_record, HistoryStore};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use sightline_core::DetectionResult;
use uuid::Uuid;

/// Process-local history, lost on restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: RwLock<Vec<DetectionResult>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn append(&self, result: &DetectionResult) -> Result<String, StoreError> {
        check_record(result)?;
        let id = Uuid::new_v4().simple().to_string();
        let mut record = result.clone();
        record.id = Some(id.clone());
        self.records.write().push(record);
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<DetectionResult>, StoreError> {
        let records = self.records.read();
        // Reverse first so equal timestamps keep newest-insert-first.
        let mut newest: Vec<DetectionResult> = records.iter().rev().cloned().collect();
        newest.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        newest.truncate(limit);
        Ok(newest)
    }

    async fn get_by_id(&self, id: &str) -> Result<DetectionResult, StoreError> {
        check_id(id)?;
        self.records
            .read()
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Detection '{}' not found", id)))
    }

    async fn collection_exists(&self) -> Result<bool, StoreError> {
        Ok(!self.records.read().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sightline_core::DetectedObject;

    fn result_at(offset_secs: i64, label: &str) -> DetectionResult {
        DetectionResult::new(
            format!("{}.jpg", label),
            Utc::now() + Duration::seconds(offset_secs),
            vec![DetectedObject::new(label, 0.9, vec![])],
        )
    }

    #[tokio::test]
    async fn test_list_recent_orders_by_timestamp() {
        let store = MemoryHistoryStore::new();
        store.append(&result_at(0, "a")).await.unwrap();
        store.append(&result_at(20, "c")).await.unwrap();
        store.append(&result_at(10, "b")).await.unwrap();

        let names: Vec<String> = store
            .list_recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["c.jpg", "b.jpg", "a.jpg"]);
        assert_eq!(store.list_recent(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_by_id_round_trip() {
        let store = MemoryHistoryStore::new();
        assert!(!store.collection_exists().await.unwrap());
        let id = store.append(&result_at(0, "cat")).await.unwrap();
        let found = store.get_by_id(&id).await.unwrap();
        assert_eq!(found.id.as_deref(), Some(id.as_str()));
        assert!(store.collection_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = MemoryHistoryStore::new();
        assert!(matches!(store.get_by_id("nope").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_by_id("a/b").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_append_rejects_invalid_record() {
        let store = MemoryHistoryStore::new();
        let mut record = result_at(0, "cat");
        record.total_objects = 4;
        assert!(matches!(store.append(&record).await, Err(StoreError::Validation(_))));
        assert!(store.is_empty());
    }
}
