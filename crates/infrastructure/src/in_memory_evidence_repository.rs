use std::collections::HashMap;

use async_trait::async_trait;
use custodia_application::EvidenceRepository;
use custodia_core::{AppError, AppResult, EvidenceId};
use custodia_domain::{Disposition, EvidenceItem};
use tokio::sync::RwLock;

/// In-memory evidence item adapter.
#[derive(Default)]
pub struct InMemoryEvidenceRepository {
    items: RwLock<HashMap<EvidenceId, EvidenceItem>>,
}

impl InMemoryEvidenceRepository {
    /// Creates an empty evidence store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvidenceRepository for InMemoryEvidenceRepository {
    async fn register(&self, item: &EvidenceItem) -> AppResult<()> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.id()) {
            return Err(AppError::Conflict(format!(
                "evidence '{}' is already registered",
                item.id()
            )));
        }

        items.insert(item.id(), item.clone());
        Ok(())
    }

    async fn find(&self, evidence_id: EvidenceId) -> AppResult<Option<EvidenceItem>> {
        Ok(self.items.read().await.get(&evidence_id).cloned())
    }

    async fn update_disposition(
        &self,
        evidence_id: EvidenceId,
        disposition: Disposition,
    ) -> AppResult<()> {
        let mut items = self.items.write().await;
        let Some(item) = items.remove(&evidence_id) else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' is not registered"
            )));
        };

        items.insert(evidence_id, item.with_disposition(disposition));
        Ok(())
    }

    async fn update_storage_ref(
        &self,
        evidence_id: EvidenceId,
        storage_ref: &str,
    ) -> AppResult<()> {
        let mut items = self.items.write().await;
        let Some(item) = items.remove(&evidence_id) else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' is not registered"
            )));
        };

        items.insert(evidence_id, item.with_storage_ref(storage_ref)?);
        Ok(())
    }

    async fn list_by_disposition(
        &self,
        disposition: Disposition,
        limit: usize,
    ) -> AppResult<Vec<EvidenceItem>> {
        let items = self.items.read().await;
        let mut listed: Vec<EvidenceItem> = items
            .values()
            .filter(|item| item.disposition() == disposition)
            .cloned()
            .collect();
        listed.sort_by_key(|item| (item.registered_at(), item.id()));
        listed.truncate(limit);
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use custodia_application::EvidenceRepository;
    use custodia_core::{EvidenceId, PartitionId};
    use custodia_domain::{Disposition, EvidenceItem, EvidenceItemInput, RetentionPolicyId};

    use super::InMemoryEvidenceRepository;

    fn item() -> EvidenceItem {
        let item = EvidenceItem::new(EvidenceItemInput {
            id: EvidenceId::new(),
            partition_id: PartitionId::new(),
            category: "document".to_owned(),
            storage_ref: "blob://primary/1".to_owned(),
            retention_policy_id: RetentionPolicyId::new(),
            registered_at: Utc::now(),
        });
        let Ok(item) = item else {
            unreachable!();
        };
        item
    }

    #[tokio::test]
    async fn double_registration_is_a_conflict() {
        let repository = InMemoryEvidenceRepository::new();
        let item = item();

        assert!(repository.register(&item).await.is_ok());
        assert!(repository.register(&item).await.is_err());
    }

    #[tokio::test]
    async fn disposition_update_is_visible() {
        let repository = InMemoryEvidenceRepository::new();
        let item = item();
        assert!(repository.register(&item).await.is_ok());
        assert!(
            repository
                .update_disposition(item.id(), Disposition::Archived)
                .await
                .is_ok()
        );

        let archived = repository
            .list_by_disposition(Disposition::Archived, 10)
            .await
            .unwrap_or_default();
        assert_eq!(archived.len(), 1);
        let active = repository
            .list_by_disposition(Disposition::Active, 10)
            .await
            .unwrap_or_default();
        assert!(active.is_empty());
    }
}
