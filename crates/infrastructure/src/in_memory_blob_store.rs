use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use custodia_application::BlobStore;
use custodia_core::{AppError, AppResult};
use tokio::sync::RwLock;

/// In-memory blob store adapter for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryBlobStore {
    prefix: String,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    next_ref: AtomicU64,
}

impl InMemoryBlobStore {
    /// Creates an empty store whose references carry the given prefix,
    /// keeping primary and archive references distinguishable in logs.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            blobs: RwLock::new(HashMap::new()),
            next_ref: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, bytes: &[u8]) -> AppResult<String> {
        let storage_ref = format!(
            "mem://{}/{}",
            self.prefix,
            self.next_ref.fetch_add(1, Ordering::SeqCst)
        );
        self.blobs
            .write()
            .await
            .insert(storage_ref.clone(), bytes.to_vec());
        Ok(storage_ref)
    }

    async fn fetch(&self, storage_ref: &str) -> AppResult<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(storage_ref)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no blob at '{storage_ref}'")))
    }

    async fn delete(&self, storage_ref: &str) -> AppResult<()> {
        self.blobs.write().await.remove(storage_ref);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use custodia_application::BlobStore;

    use super::InMemoryBlobStore;

    #[tokio::test]
    async fn store_fetch_delete_round_trip() {
        let store = InMemoryBlobStore::new("primary");
        let Ok(storage_ref) = store.store(b"payload").await else {
            unreachable!();
        };

        assert_eq!(
            store.fetch(storage_ref.as_str()).await.unwrap_or_default(),
            b"payload"
        );
        assert!(store.delete(storage_ref.as_str()).await.is_ok());
        assert!(store.fetch(storage_ref.as_str()).await.is_err());
    }
}
