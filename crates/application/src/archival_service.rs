use std::sync::Arc;

use chrono::Utc;
use custodia_core::{ActorIdentity, AppError, AppResult, EvidenceId};
use custodia_domain::{
    ArchiveRecord, AuditAction, Disposition, EvidenceItem, content_digest,
};
use serde_json::json;
use tracing::{info, warn};

use crate::archival_ports::{BlobStore, EvidenceLock, EvidenceLockCoordinator};
use crate::custody_ports::{CustodyRepository, EvidenceRepository};
use crate::ledger_ports::LedgerAppendRequest;
use crate::ledger_service::LedgerService;
use crate::notify::{ComplianceEvent, ComplianceNotifier, dispatch_best_effort};
use crate::retention_ports::{ArchiveRepository, LegalHoldRepository};


/// Lease length for the per-evidence lifecycle lock.
const LIFECYCLE_LOCK_SECONDS: u32 = 60;

/// Request to irreversibly dispose one evidence payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalInput {
    /// Physical disposal method, e.g. destruction or return-to-owner.
    pub method: String,
    /// Subject that authorized the disposal.
    pub authorized_by: String,
}

/// Performs archival, restore and irreversible disposal of evidence
/// payloads.
///
/// Every operation holds the per-evidence exclusive lock shared with
/// custody transitions; a contending call receives
/// `ConcurrentModification`, so an item is never left half-archived.
/// Content hashes are re-verified on both sides of every payload move;
/// mismatches abort without touching the original and require manual
/// intervention.
#[derive(Clone)]
pub struct ArchivalService {
    evidence: Arc<dyn EvidenceRepository>,
    custody: Arc<dyn CustodyRepository>,
    holds: Arc<dyn LegalHoldRepository>,
    archives: Arc<dyn ArchiveRepository>,
    primary_store: Arc<dyn BlobStore>,
    archive_store: Arc<dyn BlobStore>,
    locks: Arc<dyn EvidenceLockCoordinator>,
    ledger: LedgerService,
    notifier: Arc<dyn ComplianceNotifier>,
    holder_id: String,
}

impl ArchivalService {
    /// Creates an executor over the primary and encrypted archive stores.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        evidence: Arc<dyn EvidenceRepository>,
        custody: Arc<dyn CustodyRepository>,
        holds: Arc<dyn LegalHoldRepository>,
        archives: Arc<dyn ArchiveRepository>,
        primary_store: Arc<dyn BlobStore>,
        archive_store: Arc<dyn BlobStore>,
        locks: Arc<dyn EvidenceLockCoordinator>,
        ledger: LedgerService,
        notifier: Arc<dyn ComplianceNotifier>,
        holder_id: impl Into<String>,
    ) -> Self {
        Self {
            evidence,
            custody,
            holds,
            archives,
            primary_store,
            archive_store,
            locks,
            ledger,
            notifier,
            holder_id: holder_id.into(),
        }
    }

    /// Moves one payload into the archive store.
    ///
    /// The stored copy is fetched back and its digest compared against the
    /// pre-archive content digest; on mismatch the copy is discarded, the
    /// original stays untouched and the call fails with `IntegrityFailure`.
    pub async fn archive(
        &self,
        actor: &ActorIdentity,
        evidence_id: EvidenceId,
    ) -> AppResult<ArchiveRecord> {
        let item = self.find_item(evidence_id).await?;
        if item.disposition() != Disposition::Active {
            return Err(AppError::Conflict(format!(
                "evidence '{evidence_id}' is {} and cannot be archived",
                item.disposition().as_str()
            )));
        }

        let lock = self.acquire_lock(evidence_id).await?;
        let result = self.archive_locked(actor, &item).await;
        self.release_lock(&lock).await;
        result
    }

    /// Irreversibly removes one payload.
    ///
    /// Requires no active applicable hold and a terminal custody state. The
    /// terminal audit entry capturing method and authorizer is appended
    /// before the payload is removed.
    pub async fn dispose(
        &self,
        actor: &ActorIdentity,
        evidence_id: EvidenceId,
        input: DisposalInput,
    ) -> AppResult<()> {
        let item = self.find_item(evidence_id).await?;
        if item.disposition() == Disposition::Disposed {
            return Err(AppError::Conflict(format!(
                "evidence '{evidence_id}' is already disposed"
            )));
        }

        let lock = self.acquire_lock(evidence_id).await?;
        let result = self.dispose_locked(actor, &item, input).await;
        self.release_lock(&lock).await;
        result
    }

    /// Restores one archived payload to the primary store.
    ///
    /// The archive copy's digest is re-verified against the recorded
    /// `archive_hash`; on mismatch the archive is preserved untouched for
    /// forensic inspection and the call fails with `ArchiveCorrupted` — no
    /// automatic retry.
    pub async fn restore(
        &self,
        actor: &ActorIdentity,
        evidence_id: EvidenceId,
    ) -> AppResult<EvidenceItem> {
        let item = self.find_item(evidence_id).await?;
        if item.disposition() != Disposition::Archived {
            return Err(AppError::Conflict(format!(
                "evidence '{evidence_id}' is {} and cannot be restored",
                item.disposition().as_str()
            )));
        }

        let lock = self.acquire_lock(evidence_id).await?;
        let result = self.restore_locked(actor, &item).await;
        self.release_lock(&lock).await;
        result
    }

    async fn archive_locked(
        &self,
        actor: &ActorIdentity,
        item: &EvidenceItem,
    ) -> AppResult<ArchiveRecord> {
        let evidence_id = item.id();
        let payload = self.primary_store.fetch(item.storage_ref()).await?;
        let digest = content_digest(&payload);

        let archive_ref = self.archive_store.store(&payload).await?;
        let stored_copy = self.archive_store.fetch(archive_ref.as_str()).await?;
        if content_digest(&stored_copy) != digest {
            if let Err(error) = self.archive_store.delete(archive_ref.as_str()).await {
                warn!(
                    evidence_id = %evidence_id,
                    error = %error,
                    "failed to discard mismatched archive copy"
                );
            }
            dispatch_best_effort(
                self.notifier.as_ref(),
                ComplianceEvent::IntegrityFailure {
                    partition_id: item.partition_id(),
                    sequence_no: None,
                    reason: "archive copy digest mismatch".to_owned(),
                },
            )
            .await;
            return Err(AppError::IntegrityFailure(format!(
                "archive copy of evidence '{evidence_id}' does not match the pre-archive digest"
            )));
        }

        let record = ArchiveRecord::new(evidence_id, Utc::now(), digest.clone(), archive_ref)?;
        self.archives.save(&record).await?;

        self.ledger
            .append(
                actor,
                LedgerAppendRequest {
                    partition_id: item.partition_id(),
                    action: AuditAction::EvidenceArchived,
                    entity_type: "evidence".to_owned(),
                    entity_id: evidence_id.to_string(),
                    payload: json!({
                        "archive_hash": digest,
                        "storage_ref": record.storage_ref(),
                    }),
                },
            )
            .await?;

        self.evidence
            .update_disposition(evidence_id, Disposition::Archived)
            .await?;

        if let Err(error) = self.primary_store.delete(item.storage_ref()).await {
            warn!(
                evidence_id = %evidence_id,
                error = %error,
                "archived payload still present in primary store"
            );
        }

        info!(evidence_id = %evidence_id, "evidence payload archived");
        Ok(record)
    }

    async fn dispose_locked(
        &self,
        actor: &ActorIdentity,
        item: &EvidenceItem,
        input: DisposalInput,
    ) -> AppResult<()> {
        let evidence_id = item.id();
        let holds = self
            .holds
            .active_holds_for(evidence_id, item.partition_id())
            .await?;
        if let Some(hold) = holds.first() {
            dispatch_best_effort(
                self.notifier.as_ref(),
                ComplianceEvent::LegalHoldBlockedDisposal {
                    evidence_id,
                    hold_id: hold.id(),
                },
            )
            .await;
            return Err(AppError::LegalHoldViolation(format!(
                "evidence '{evidence_id}' is under active legal hold '{}'",
                hold.id()
            )));
        }

        let terminal = self
            .custody
            .last_entry(evidence_id)
            .await?
            .is_some_and(|entry| entry.action().resulting_state().is_terminal());
        if !terminal {
            return Err(AppError::InvalidTransition(format!(
                "evidence '{evidence_id}' must reach a terminal custody state before disposal"
            )));
        }

        // Durable terminal audit entry precedes the irreversible removal.
        self.ledger
            .append(
                actor,
                LedgerAppendRequest {
                    partition_id: item.partition_id(),
                    action: AuditAction::EvidenceDisposed,
                    entity_type: "evidence".to_owned(),
                    entity_id: evidence_id.to_string(),
                    payload: json!({
                        "method": input.method,
                        "authorized_by": input.authorized_by,
                    }),
                },
            )
            .await?;

        match item.disposition() {
            Disposition::Active => {
                self.primary_store.delete(item.storage_ref()).await?;
            }
            Disposition::Archived => {
                if let Some(record) = self.archives.find(evidence_id).await? {
                    self.archive_store.delete(record.storage_ref()).await?;
                }
            }
            Disposition::Disposed => {}
        }

        self.evidence
            .update_disposition(evidence_id, Disposition::Disposed)
            .await?;

        info!(
            evidence_id = %evidence_id,
            method = input.method.as_str(),
            "evidence payload disposed"
        );
        Ok(())
    }

    async fn restore_locked(
        &self,
        actor: &ActorIdentity,
        item: &EvidenceItem,
    ) -> AppResult<EvidenceItem> {
        let evidence_id = item.id();
        let Some(record) = self.archives.find(evidence_id).await? else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' has no archive record"
            )));
        };
        if record.restored_at().is_some() {
            return Err(AppError::Conflict(format!(
                "archive record for evidence '{evidence_id}' is already restored"
            )));
        }

        let payload = self.archive_store.fetch(record.storage_ref()).await?;
        if content_digest(&payload) != record.archive_hash() {
            dispatch_best_effort(
                self.notifier.as_ref(),
                ComplianceEvent::IntegrityFailure {
                    partition_id: item.partition_id(),
                    sequence_no: None,
                    reason: "archived payload digest mismatch".to_owned(),
                },
            )
            .await;
            return Err(AppError::ArchiveCorrupted(format!(
                "archived payload of evidence '{evidence_id}' does not match its recorded hash; \
                 the archive is preserved for forensic inspection"
            )));
        }

        let primary_ref = self.primary_store.store(&payload).await?;
        self.archives.mark_restored(evidence_id, Utc::now()).await?;
        self.evidence
            .update_storage_ref(evidence_id, primary_ref.as_str())
            .await?;
        self.evidence
            .update_disposition(evidence_id, Disposition::Active)
            .await?;

        self.ledger
            .append(
                actor,
                LedgerAppendRequest {
                    partition_id: item.partition_id(),
                    action: AuditAction::EvidenceRestored,
                    entity_type: "evidence".to_owned(),
                    entity_id: evidence_id.to_string(),
                    payload: json!({
                        "archive_hash": record.archive_hash(),
                        "storage_ref": primary_ref,
                    }),
                },
            )
            .await?;

        info!(evidence_id = %evidence_id, "evidence payload restored");
        let Some(updated) = self.evidence.find(evidence_id).await? else {
            return Err(AppError::Internal(format!(
                "evidence '{evidence_id}' disappeared during restore"
            )));
        };
        Ok(updated)
    }

    async fn find_item(&self, evidence_id: EvidenceId) -> AppResult<EvidenceItem> {
        let Some(item) = self.evidence.find(evidence_id).await? else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' is not registered"
            )));
        };
        Ok(item)
    }

    async fn acquire_lock(&self, evidence_id: EvidenceId) -> AppResult<EvidenceLock> {
        let Some(lock) = self
            .locks
            .try_acquire(evidence_id, self.holder_id.as_str(), LIFECYCLE_LOCK_SECONDS)
            .await?
        else {
            return Err(AppError::ConcurrentModification(format!(
                "a transition or lifecycle action is in flight for evidence '{evidence_id}'"
            )));
        };
        Ok(lock)
    }

    async fn release_lock(&self, lock: &EvidenceLock) {
        if let Err(error) = self.locks.release(lock).await {
            warn!(
                evidence_id = %lock.evidence_id,
                error = %error,
                "failed to release evidence lock; it will expire with its lease"
            );
        }
    }
}
