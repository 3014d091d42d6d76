use async_trait::async_trait;
use custodia_core::{AppResult, PartitionId};
use custodia_domain::{AuditAction, AuditEntry, ChainTail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to append one entry to a partition's ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAppendRequest {
    /// Target ledger partition.
    pub partition_id: PartitionId,
    /// Stable audit action.
    pub action: AuditAction,
    /// Entity type label.
    pub entity_type: String,
    /// Entity identifier.
    pub entity_id: String,
    /// JSON payload describing the action; the ledger chains its digest.
    pub payload: Value,
}

/// Port for the append-only, hash-chained audit entry store.
///
/// Implementations must enforce a uniqueness constraint on
/// `(partition_id, sequence_no)` and surface a violation as
/// `AppError::Conflict`; the ledger writer turns that into a retry against
/// the new tail so the chain never forks.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Returns the last committed sequence and hash of one partition.
    async fn tail(&self, partition_id: PartitionId) -> AppResult<Option<ChainTail>>;

    /// Persists one entry; fails with `Conflict` when the slot is taken.
    async fn insert(&self, entry: &AuditEntry) -> AppResult<()>;

    /// Returns entries with `from_sequence <= sequence_no <= to_sequence`,
    /// ordered by sequence number.
    async fn entries_in_range(
        &self,
        partition_id: PartitionId,
        from_sequence: u64,
        to_sequence: u64,
    ) -> AppResult<Vec<AuditEntry>>;

    /// Returns every entry for one entity across the partition, ordered by
    /// sequence number.
    async fn entries_for_entity(
        &self,
        partition_id: PartitionId,
        entity_type: &str,
        entity_id: &str,
    ) -> AppResult<Vec<AuditEntry>>;

    /// Returns the total number of committed entries across all partitions.
    async fn count_entries(&self) -> AppResult<u64>;

    /// Returns every partition holding at least one entry.
    async fn partitions(&self) -> AppResult<Vec<PartitionId>>;
}

/// Last verified position of one partition's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCheckpoint {
    /// Checkpointed partition.
    pub partition_id: PartitionId,
    /// Last verified sequence number.
    pub sequence_no: u64,
    /// Hash of the last verified entry.
    pub entry_hash: String,
}

/// A ledger range that failed verification and is marked unverified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenRange {
    /// Affected partition.
    pub partition_id: PartitionId,
    /// First sequence number of the unverified range.
    pub from_sequence: u64,
    /// Last sequence number of the unverified range.
    pub to_sequence: u64,
    /// Failure description.
    pub reason: String,
}

/// Port for resumable-verification checkpoints and failure bookkeeping.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Returns the stored checkpoint for one partition.
    async fn load(&self, partition_id: PartitionId) -> AppResult<Option<VerificationCheckpoint>>;

    /// Stores a checkpoint, replacing any previous one for the partition.
    async fn store(&self, checkpoint: VerificationCheckpoint) -> AppResult<()>;

    /// Records a range that failed verification; failures are never
    /// auto-corrected, only surfaced.
    async fn record_broken_range(&self, range: BrokenRange) -> AppResult<()>;

    /// Returns every recorded broken range.
    async fn list_broken_ranges(&self) -> AppResult<Vec<BrokenRange>>;
}
