use super::{check_id, check_record, HistoryStore};
use crate::error::StoreError;
use async_trait::async_trait;
use sightline_core::DetectionResult;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
use uuid::Uuid;

/// Embedded history. The collection is a sled tree of `id -> json`; a
/// sibling tree keyed by `timestamp ++ id` keeps recency order.
pub struct SledHistoryStore {
    db: sled::Db,
    collection: String,
    index_name: String,
}

impl SledHistoryStore {
    pub fn open(path: &Path, collection: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Unavailable(format!("Sled error: {}", e)))?;
        Ok(Self::with_db(db, collection))
    }

    pub fn with_db(db: sled::Db, collection: &str) -> Self {
        Self {
            db,
            collection: collection.to_string(),
            index_name: format!("{}.by_time", collection),
        }
    }

    fn tree_exists(&self, name: &str) -> bool {
        self.db.tree_names().iter().any(|n| n.as_ref() == name.as_bytes())
    }

    fn records(&self) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(&self.collection)?)
    }

    fn index(&self) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(&self.index_name)?)
    }

    fn decode(id: &str, bytes: &[u8]) -> Result<DetectionResult, StoreError> {
        let mut record: DetectionResult = serde_json::from_slice(bytes)
            .map_err(|e| StoreError::Backend(format!("corrupt record {}: {}", id, e)))?;
        record.id = Some(id.to_string());
        Ok(record)
    }
}

/// Big-endian key that sorts signed millis in chronological order.
pub(crate) fn time_key(millis: i64, id: &str) -> Vec<u8> {
    let ordered = (millis as u64) ^ (1u64 << 63);
    let mut key = Vec::with_capacity(8 + id.len());
    key.extend_from_slice(&ordered.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

#[async_trait]
impl HistoryStore for SledHistoryStore {
    fn name(&self) -> &'static str {
        "sled"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.size_on_disk()?;
        Ok(())
    }

    async fn append(&self, result: &DetectionResult) -> Result<String, StoreError> {
        check_record(result)?;

        let id = Uuid::new_v4().simple().to_string();
        let mut stored = result.clone();
        stored.id = None;
        let body = serde_json::to_vec(&stored).map_err(|e| StoreError::Backend(e.to_string()))?;
        let key = time_key(result.timestamp.timestamp_millis(), &id);

        let records = self.records()?;
        let index = self.index()?;
        (&records, &index)
            .transaction(|(records, index)| {
                records.insert(id.as_bytes(), body.as_slice())?;
                index.insert(key.as_slice(), id.as_bytes())?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StoreError::from(e),
                TransactionError::Abort(()) => StoreError::Backend("transaction aborted".to_string()),
            })?;

        self.db.flush_async().await?;
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<DetectionResult>, StoreError> {
        if !self.tree_exists(&self.index_name) {
            return Ok(Vec::new());
        }

        let records = self.records()?;
        let index = self.index()?;
        let mut out = Vec::with_capacity(limit.min(64));
        for entry in index.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_, id) = entry?;
            let id = String::from_utf8_lossy(&id).into_owned();
            if let Some(bytes) = records.get(id.as_bytes())? {
                out.push(Self::decode(&id, &bytes)?);
            }
        }
        Ok(out)
    }

    async fn get_by_id(&self, id: &str) -> Result<DetectionResult, StoreError> {
        check_id(id)?;
        let not_found = || StoreError::NotFound(format!("Detection '{}' not found", id));
        if !self.tree_exists(&self.collection) {
            return Err(not_found());
        }

        match self.records()?.get(id.as_bytes())? {
            Some(bytes) => Self::decode(id, &bytes),
            None => Err(not_found()),
        }
    }

    async fn collection_exists(&self) -> Result<bool, StoreError> {
        if !self.tree_exists(&self.collection) {
            return Ok(false);
        }
        Ok(!self.records()?.is_empty())
    }
}
