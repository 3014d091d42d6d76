use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custodia_core::{AppResult, EvidenceId, PartitionId};
use custodia_domain::{ArchiveRecord, LegalHold, LegalHoldId, RetentionPolicy, RetentionPolicyId};

/// Port for retention policy definitions.
#[async_trait]
pub trait RetentionPolicyRepository: Send + Sync {
    /// Persists one policy, replacing any previous version.
    async fn save(&self, policy: &RetentionPolicy) -> AppResult<()>;

    /// Returns one policy by id.
    async fn find(&self, policy_id: RetentionPolicyId) -> AppResult<Option<RetentionPolicy>>;
}

/// Port for legal hold records.
///
/// Released holds are updated in place, never deleted, so past holds stay
/// auditable.
#[async_trait]
pub trait LegalHoldRepository: Send + Sync {
    /// Persists one hold, replacing any previous version of the same id.
    async fn save(&self, hold: &LegalHold) -> AppResult<()>;

    /// Returns one hold by id.
    async fn find(&self, hold_id: LegalHoldId) -> AppResult<Option<LegalHold>>;

    /// Returns the active holds applying to one item, directly or through
    /// its case partition.
    async fn active_holds_for(
        &self,
        evidence_id: EvidenceId,
        partition_id: PartitionId,
    ) -> AppResult<Vec<LegalHold>>;

    /// Returns every active hold.
    async fn active_holds(&self) -> AppResult<Vec<LegalHold>>;
}

/// Port for archive records.
#[async_trait]
pub trait ArchiveRepository: Send + Sync {
    /// Persists one record; fails with `Conflict` while an unrestored
    /// record exists for the same item.
    async fn save(&self, record: &ArchiveRecord) -> AppResult<()>;

    /// Returns the latest record for one item.
    async fn find(&self, evidence_id: EvidenceId) -> AppResult<Option<ArchiveRecord>>;

    /// Marks the latest record for one item restored.
    async fn mark_restored(
        &self,
        evidence_id: EvidenceId,
        restored_at: DateTime<Utc>,
    ) -> AppResult<()>;
}
