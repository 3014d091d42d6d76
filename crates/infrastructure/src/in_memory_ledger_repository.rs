use std::collections::BTreeMap;

use async_trait::async_trait;
use custodia_application::LedgerRepository;
use custodia_core::{AppError, AppResult, PartitionId};
use custodia_domain::{AuditEntry, ChainTail};
use tokio::sync::RwLock;

/// In-memory ledger adapter for tests and single-process deployments.
///
/// The `(partition, sequence)` map key provides the same uniqueness
/// guarantee the PostgreSQL adapter gets from its primary key, so a losing
/// concurrent append observes `Conflict` here too.
#[derive(Default)]
pub struct InMemoryLedgerRepository {
    entries: RwLock<BTreeMap<(PartitionId, u64), AuditEntry>>,
}

impl InMemoryLedgerRepository {
    /// Creates an empty in-memory ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn tail(&self, partition_id: PartitionId) -> AppResult<Option<ChainTail>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range((partition_id, 0)..=(partition_id, u64::MAX))
            .next_back()
            .map(|(_, entry)| entry.tail()))
    }

    async fn insert(&self, entry: &AuditEntry) -> AppResult<()> {
        let key = (entry.partition_id(), entry.sequence_no());
        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "audit entry ({}, {}) already exists",
                entry.partition_id(),
                entry.sequence_no()
            )));
        }

        entries.insert(key, entry.clone());
        Ok(())
    }

    async fn entries_in_range(
        &self,
        partition_id: PartitionId,
        from_sequence: u64,
        to_sequence: u64,
    ) -> AppResult<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range((partition_id, from_sequence)..=(partition_id, to_sequence))
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn entries_for_entity(
        &self,
        partition_id: PartitionId,
        entity_type: &str,
        entity_id: &str,
    ) -> AppResult<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range((partition_id, 0)..=(partition_id, u64::MAX))
            .filter(|(_, entry)| {
                entry.entity_type() == entity_type && entry.entity_id() == entity_id
            })
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn count_entries(&self) -> AppResult<u64> {
        Ok(self.entries.read().await.len() as u64)
    }

    async fn partitions(&self) -> AppResult<Vec<PartitionId>> {
        let entries = self.entries.read().await;
        let mut partitions: Vec<PartitionId> =
            entries.keys().map(|(partition_id, _)| *partition_id).collect();
        partitions.dedup();
        Ok(partitions)
    }
}
