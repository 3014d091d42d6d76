use std::collections::HashMap;

use async_trait::async_trait;
use custodia_application::{EvidenceLock, EvidenceLockCoordinator};
use custodia_core::{AppError, AppResult, EvidenceId};
use tokio::sync::Mutex;

/// In-memory per-evidence lock coordinator for single-process deployments.
///
/// Leases do not expire here; a crashed holder in a single process takes
/// its locks with it. Multi-instance deployments use the Redis coordinator,
/// where the lease TTL bounds a lost lock.
#[derive(Default)]
pub struct InMemoryEvidenceLockCoordinator {
    locks: Mutex<HashMap<EvidenceId, String>>,
    counter: std::sync::atomic::AtomicU64,
}

impl InMemoryEvidenceLockCoordinator {
    /// Creates a coordinator with no held locks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvidenceLockCoordinator for InMemoryEvidenceLockCoordinator {
    async fn try_acquire(
        &self,
        evidence_id: EvidenceId,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<EvidenceLock>> {
        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "evidence lock holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "evidence lock lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let mut locks = self.locks.lock().await;
        if locks.contains_key(&evidence_id) {
            return Ok(None);
        }

        let token = format!(
            "{holder_id}:{}",
            self.counter
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
        );
        locks.insert(evidence_id, token.clone());

        Ok(Some(EvidenceLock {
            evidence_id,
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release(&self, lock: &EvidenceLock) -> AppResult<()> {
        let mut locks = self.locks.lock().await;
        if locks
            .get(&lock.evidence_id)
            .is_some_and(|token| token == &lock.token)
        {
            locks.remove(&lock.evidence_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use custodia_application::EvidenceLockCoordinator;
    use custodia_core::EvidenceId;

    use super::InMemoryEvidenceLockCoordinator;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let coordinator = InMemoryEvidenceLockCoordinator::new();
        let evidence_id = EvidenceId::new();

        let Ok(Some(lock)) = coordinator.try_acquire(evidence_id, "worker-1", 30).await else {
            unreachable!();
        };
        let contended = coordinator.try_acquire(evidence_id, "worker-2", 30).await;
        assert!(matches!(contended, Ok(None)));

        assert!(coordinator.release(&lock).await.is_ok());
        let reacquired = coordinator.try_acquire(evidence_id, "worker-2", 30).await;
        assert!(matches!(reacquired, Ok(Some(_))));
    }

    #[tokio::test]
    async fn release_with_stale_token_is_a_no_op() {
        let coordinator = InMemoryEvidenceLockCoordinator::new();
        let evidence_id = EvidenceId::new();

        let Ok(Some(mut stale)) = coordinator.try_acquire(evidence_id, "worker-1", 30).await
        else {
            unreachable!();
        };
        stale.token = "worker-1:stale".to_owned();

        assert!(coordinator.release(&stale).await.is_ok());
        let still_held = coordinator.try_acquire(evidence_id, "worker-2", 30).await;
        assert!(matches!(still_held, Ok(None)));
    }
}
