//! In-memory adapters for the retention-side repositories: policies, legal
//! holds and archive records.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custodia_application::{ArchiveRepository, LegalHoldRepository, RetentionPolicyRepository};
use custodia_core::{AppError, AppResult, EvidenceId, PartitionId};
use custodia_domain::{ArchiveRecord, LegalHold, LegalHoldId, RetentionPolicy, RetentionPolicyId};
use tokio::sync::RwLock;

/// In-memory retention policy adapter.
#[derive(Default)]
pub struct InMemoryRetentionPolicyRepository {
    policies: RwLock<HashMap<RetentionPolicyId, RetentionPolicy>>,
}

impl InMemoryRetentionPolicyRepository {
    /// Creates an empty policy store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetentionPolicyRepository for InMemoryRetentionPolicyRepository {
    async fn save(&self, policy: &RetentionPolicy) -> AppResult<()> {
        self.policies
            .write()
            .await
            .insert(policy.id(), policy.clone());
        Ok(())
    }

    async fn find(&self, policy_id: RetentionPolicyId) -> AppResult<Option<RetentionPolicy>> {
        Ok(self.policies.read().await.get(&policy_id).cloned())
    }
}

/// In-memory legal hold adapter; released holds stay stored for audit.
#[derive(Default)]
pub struct InMemoryLegalHoldRepository {
    holds: RwLock<HashMap<LegalHoldId, LegalHold>>,
}

impl InMemoryLegalHoldRepository {
    /// Creates an empty hold store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LegalHoldRepository for InMemoryLegalHoldRepository {
    async fn save(&self, hold: &LegalHold) -> AppResult<()> {
        self.holds.write().await.insert(hold.id(), hold.clone());
        Ok(())
    }

    async fn find(&self, hold_id: LegalHoldId) -> AppResult<Option<LegalHold>> {
        Ok(self.holds.read().await.get(&hold_id).cloned())
    }

    async fn active_holds_for(
        &self,
        evidence_id: EvidenceId,
        partition_id: PartitionId,
    ) -> AppResult<Vec<LegalHold>> {
        let holds = self.holds.read().await;
        Ok(holds
            .values()
            .filter(|hold| hold.is_active() && hold.applies_to(evidence_id, partition_id))
            .cloned()
            .collect())
    }

    async fn active_holds(&self) -> AppResult<Vec<LegalHold>> {
        let holds = self.holds.read().await;
        Ok(holds
            .values()
            .filter(|hold| hold.is_active())
            .cloned()
            .collect())
    }
}

/// In-memory archive record adapter.
#[derive(Default)]
pub struct InMemoryArchiveRepository {
    records: RwLock<HashMap<EvidenceId, ArchiveRecord>>,
}

impl InMemoryArchiveRepository {
    /// Creates an empty archive record store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveRepository for InMemoryArchiveRepository {
    async fn save(&self, record: &ArchiveRecord) -> AppResult<()> {
        let mut records = self.records.write().await;
        if records
            .get(&record.evidence_id())
            .is_some_and(|existing| existing.restored_at().is_none())
        {
            return Err(AppError::Conflict(format!(
                "evidence '{}' already has an unrestored archive record",
                record.evidence_id()
            )));
        }

        records.insert(record.evidence_id(), record.clone());
        Ok(())
    }

    async fn find(&self, evidence_id: EvidenceId) -> AppResult<Option<ArchiveRecord>> {
        Ok(self.records.read().await.get(&evidence_id).cloned())
    }

    async fn mark_restored(
        &self,
        evidence_id: EvidenceId,
        restored_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&evidence_id) else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' has no archive record"
            )));
        };

        record.mark_restored(restored_at)
    }
}
