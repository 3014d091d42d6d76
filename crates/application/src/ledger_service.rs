use std::sync::Arc;

use chrono::Utc;
use custodia_core::{ActorIdentity, AppError, AppResult};
use custodia_domain::{AuditEntry, AuditEntryInput};
use tracing::debug;

use crate::ledger_ports::{LedgerAppendRequest, LedgerRepository};


/// Maximum tail re-reads before a contended append gives up.
const MAX_APPEND_ATTEMPTS: u32 = 8;

/// Append-only writer for the hash-chained audit ledger.
///
/// Appends within one partition are serialized through a compare-and-swap
/// retry loop on the chain tail: a losing concurrent attempt observes the
/// repository's uniqueness conflict and rebuilds its entry against the new
/// `prev_hash`, so the chain never forks. The entry is durably persisted
/// before it is returned.
#[derive(Clone)]
pub struct LedgerService {
    repository: Arc<dyn LedgerRepository>,
}

impl LedgerService {
    /// Creates a ledger writer over a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn LedgerRepository>) -> Self {
        Self { repository }
    }

    /// Returns the underlying repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn LedgerRepository> {
        &self.repository
    }

    /// Appends one entry to the requested partition.
    ///
    /// Returns the committed entry. `StorageUnavailable` means nothing was
    /// recorded and the caller retries with backoff;
    /// `ConcurrentModification` means the partition stayed contended for
    /// every attempt.
    pub async fn append(
        &self,
        actor: &ActorIdentity,
        request: LedgerAppendRequest,
    ) -> AppResult<AuditEntry> {
        let LedgerAppendRequest {
            partition_id,
            action,
            entity_type,
            entity_id,
            payload,
        } = request;

        for attempt in 0..MAX_APPEND_ATTEMPTS {
            let tail = self.repository.tail(partition_id).await?;
            let entry = AuditEntry::chained(
                AuditEntryInput {
                    partition_id,
                    actor_subject: actor.subject().to_owned(),
                    action,
                    entity_type: entity_type.clone(),
                    entity_id: entity_id.clone(),
                    payload: payload.clone(),
                },
                tail.as_ref(),
                Utc::now(),
            )?;

            match self.repository.insert(&entry).await {
                Ok(()) => {
                    debug!(
                        partition_id = %partition_id,
                        sequence_no = entry.sequence_no(),
                        action = action.as_str(),
                        "audit entry committed"
                    );
                    return Ok(entry);
                }
                Err(AppError::Conflict(_)) => {
                    debug!(
                        partition_id = %partition_id,
                        attempt,
                        "append lost the tail race, retrying against new prev_hash"
                    );
                }
                Err(error) => return Err(error),
            }
        }

        Err(AppError::ConcurrentModification(format!(
            "partition '{partition_id}' stayed contended for {MAX_APPEND_ATTEMPTS} append attempts"
        )))
    }
}
