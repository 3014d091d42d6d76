use async_trait::async_trait;
use custodia_core::{AppResult, EvidenceId};

/// Port for payload blob storage.
///
/// The engine manipulates only digests and opaque references; bytes are
/// moved between a primary store and a separate encrypted archive store,
/// both behind this interface. Encryption-at-rest key management is the
/// store's concern.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores a payload and returns an opaque reference.
    async fn store(&self, bytes: &[u8]) -> AppResult<String>;

    /// Fetches a payload by reference.
    async fn fetch(&self, storage_ref: &str) -> AppResult<Vec<u8>>;

    /// Deletes a payload by reference.
    async fn delete(&self, storage_ref: &str) -> AppResult<()>;
}

/// A held per-evidence exclusive lock.
///
/// The token is compared on release so an expired lock taken over by
/// another holder is never released by the original one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceLock {
    /// Locked evidence item.
    pub evidence_id: EvidenceId,
    /// Fencing token for compare-and-delete release.
    pub token: String,
    /// Identity of the holder.
    pub holder_id: String,
}

/// Coordination port serializing custody transitions and lifecycle actions
/// per evidence item.
///
/// A contender that fails to acquire the lock receives
/// `ConcurrentModification` from the calling service and retries against
/// the updated state; items are never left half-archived.
#[async_trait]
pub trait EvidenceLockCoordinator: Send + Sync {
    /// Attempts to acquire the lock for one item.
    async fn try_acquire(
        &self,
        evidence_id: EvidenceId,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<EvidenceLock>>;

    /// Releases one lock using token compare-and-delete semantics.
    async fn release(&self, lock: &EvidenceLock) -> AppResult<()>;
}
