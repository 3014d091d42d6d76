use std::collections::BTreeMap;

use async_trait::async_trait;
use custodia_application::CustodyRepository;
use custodia_core::{AppError, AppResult, EvidenceId};
use custodia_domain::CustodyEntry;
use tokio::sync::RwLock;

/// In-memory custody entry adapter.
#[derive(Default)]
pub struct InMemoryCustodyRepository {
    entries: RwLock<BTreeMap<(EvidenceId, u64), CustodyEntry>>,
}

impl InMemoryCustodyRepository {
    /// Creates an empty custody store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustodyRepository for InMemoryCustodyRepository {
    async fn insert(&self, entry: &CustodyEntry) -> AppResult<()> {
        let key = (entry.evidence_id(), entry.sequence_no());
        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "custody entry ({}, {}) already exists",
                entry.evidence_id(),
                entry.sequence_no()
            )));
        }

        entries.insert(key, entry.clone());
        Ok(())
    }

    async fn entries_for_evidence(
        &self,
        evidence_id: EvidenceId,
    ) -> AppResult<Vec<CustodyEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range((evidence_id, 0)..=(evidence_id, u64::MAX))
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn last_entry(&self, evidence_id: EvidenceId) -> AppResult<Option<CustodyEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range((evidence_id, 0)..=(evidence_id, u64::MAX))
            .next_back()
            .map(|(_, entry)| entry.clone()))
    }
}
