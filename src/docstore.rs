use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum DocStoreError {
    #[error("document store write failed: {0}")]
    WriteFailed(String),
}

/// "Log one document keyed by conversation id" — the only document-store
/// capability the gateway needs. Must never update an existing document;
/// each session writes exactly one via `create_one`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_one(&self, partition_key: &str, document: Value) -> Result<(), DocStoreError>;
}

/// Used when `DOCSTORE_*` configuration is absent. Accepts (but discards)
/// every document, so a disabled logger never fails a session's teardown
/// path. The caller is responsible for warning once at startup that
/// persistence is disabled; see `main`.
pub struct NullDocumentStore;

#[async_trait]
impl DocumentStore for NullDocumentStore {
    async fn create_one(&self, _partition_key: &str, _document: Value) -> Result<(), DocStoreError> {
        Ok(())
    }
}

/// In-process store used in tests.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<Vec<(String, Value)>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<(String, Value)> {
        self.documents.lock().await.clone()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_one(&self, partition_key: &str, document: Value) -> Result<(), DocStoreError> {
        self.documents.lock().await.push((partition_key.to_string(), document));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_store_records_every_write_keyed_by_partition() {
        let store = InMemoryDocumentStore::new();
        store.create_one("c42", json!({"id": "ai_conv_1"})).await.unwrap();
        store.create_one("c42", json!({"id": "ai_conv_2"})).await.unwrap();
        let all = store.all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "c42");
    }

    #[tokio::test]
    async fn null_store_always_succeeds() {
        let store = NullDocumentStore;
        store.create_one("anyone", json!({})).await.unwrap();
    }
}
