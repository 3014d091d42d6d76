use std::collections::HashMap;

use async_trait::async_trait;
use custodia_application::{BrokenRange, CheckpointRepository, VerificationCheckpoint};
use custodia_core::{AppResult, PartitionId};
use tokio::sync::RwLock;

/// In-memory checkpoint and broken-range bookkeeping.
#[derive(Default)]
pub struct InMemoryCheckpointRepository {
    checkpoints: RwLock<HashMap<PartitionId, VerificationCheckpoint>>,
    broken_ranges: RwLock<Vec<BrokenRange>>,
}

impl InMemoryCheckpointRepository {
    /// Creates an empty checkpoint store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointRepository for InMemoryCheckpointRepository {
    async fn load(&self, partition_id: PartitionId) -> AppResult<Option<VerificationCheckpoint>> {
        Ok(self.checkpoints.read().await.get(&partition_id).cloned())
    }

    async fn store(&self, checkpoint: VerificationCheckpoint) -> AppResult<()> {
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.partition_id, checkpoint);
        Ok(())
    }

    async fn record_broken_range(&self, range: BrokenRange) -> AppResult<()> {
        let mut ranges = self.broken_ranges.write().await;
        ranges.retain(|existing| {
            existing.partition_id != range.partition_id
                || existing.from_sequence != range.from_sequence
        });
        ranges.push(range);
        Ok(())
    }

    async fn list_broken_ranges(&self) -> AppResult<Vec<BrokenRange>> {
        Ok(self.broken_ranges.read().await.clone())
    }
}
