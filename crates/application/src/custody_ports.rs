use async_trait::async_trait;
use custodia_core::{AppResult, EvidenceId};
use custodia_domain::{CustodyEntry, Disposition, EvidenceItem};

/// Port for the append-only per-evidence custody entry store.
///
/// Implementations must enforce a uniqueness constraint on
/// `(evidence_id, sequence_no)` and surface a violation as
/// `AppError::Conflict`; the custody service maps that to
/// `ConcurrentModification` so a losing writer retries against the updated
/// state.
#[async_trait]
pub trait CustodyRepository: Send + Sync {
    /// Persists one custody entry; fails with `Conflict` when the slot is
    /// taken.
    async fn insert(&self, entry: &CustodyEntry) -> AppResult<()>;

    /// Returns every entry for one item, ordered by sequence number.
    async fn entries_for_evidence(&self, evidence_id: EvidenceId)
    -> AppResult<Vec<CustodyEntry>>;

    /// Returns the latest entry for one item.
    async fn last_entry(&self, evidence_id: EvidenceId) -> AppResult<Option<CustodyEntry>>;
}

/// Port for evidence items tracked by the engine.
#[async_trait]
pub trait EvidenceRepository: Send + Sync {
    /// Registers one item; fails with `Conflict` when the id is taken.
    async fn register(&self, item: &EvidenceItem) -> AppResult<()>;

    /// Returns one item by id.
    async fn find(&self, evidence_id: EvidenceId) -> AppResult<Option<EvidenceItem>>;

    /// Replaces the disposition of one item.
    async fn update_disposition(
        &self,
        evidence_id: EvidenceId,
        disposition: Disposition,
    ) -> AppResult<()>;

    /// Replaces the primary storage reference of one item.
    async fn update_storage_ref(
        &self,
        evidence_id: EvidenceId,
        storage_ref: &str,
    ) -> AppResult<()>;

    /// Returns items in one disposition, ordered by registration time.
    async fn list_by_disposition(
        &self,
        disposition: Disposition,
        limit: usize,
    ) -> AppResult<Vec<EvidenceItem>>;
}
