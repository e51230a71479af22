//! Append-only detection history behind a document-store seam

mod firestore;
mod memory;
mod sled_store;

pub use firestore::FirestoreHistoryStore;
pub use memory::MemoryHistoryStore;
pub use sled_store::SledHistoryStore;

use crate::auth::GoogleAuth;
use crate::error::StoreError;
use async_trait::async_trait;
use sightline_core::config::{GoogleCloudConfig, HistoryBackend, HistoryConfig};
use sightline_core::DetectionResult;
use std::sync::Arc;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lightweight reachability check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Persist a new record and return the assigned id. The record's own
    /// `id` field is ignored.
    async fn append(&self, result: &DetectionResult) -> Result<String, StoreError>;

    /// Newest first by timestamp. A collection that was never written
    /// yields an empty list.
    async fn list_recent(&self, limit: usize) -> Result<Vec<DetectionResult>, StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<DetectionResult, StoreError>;

    /// Whether at least one record was ever written to the collection.
    async fn collection_exists(&self) -> Result<bool, StoreError>;
}

/// Records are validated before they cross the store boundary.
pub(crate) fn check_record(result: &DetectionResult) -> Result<(), StoreError> {
    result.validate().map_err(StoreError::from)
}

pub(crate) fn check_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.contains('/') || id.len() > 1500 {
        return Err(StoreError::NotFound(format!("Detection '{}' not found", id)));
    }
    Ok(())
}

pub fn build_history_store(
    history: &HistoryConfig,
    google: &GoogleCloudConfig,
    auth: Arc<GoogleAuth>,
) -> Result<Arc<dyn HistoryStore>, StoreError> {
    let store: Arc<dyn HistoryStore> = match history.backend {
        HistoryBackend::Memory => Arc::new(MemoryHistoryStore::new()),
        HistoryBackend::Sled => Arc::new(SledHistoryStore::open(&history.data_dir, &history.collection)?),
        HistoryBackend::Firestore => Arc::new(FirestoreHistoryStore::new(history, google, auth)?),
    };
    Ok(store)
}
