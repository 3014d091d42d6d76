use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use custodia_core::{ActorIdentity, AppResult, EvidenceId, PartitionId};
use custodia_domain::{AuditAction, GENESIS_HASH};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::ledger_ports::{
    BrokenRange, CheckpointRepository, LedgerAppendRequest, LedgerRepository,
    VerificationCheckpoint,
};
use crate::ledger_service::LedgerService;
use crate::notify::{ComplianceEvent, ComplianceNotifier, dispatch_best_effort};


/// Entries re-hashed per batch between checkpoint writes and cancel checks.
const VERIFY_BATCH_SIZE: u64 = 512;

/// Why a verified range is not intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerificationFailure {
    /// A recomputed hash disagrees with the stored one.
    HashMismatch {
        /// First offending sequence number.
        sequence_no: u64,
    },
    /// Sequence numbers are missing; distinct from tampering.
    SequenceGap {
        /// First missing sequence number.
        missing_from: u64,
        /// Last missing sequence number.
        missing_to: u64,
    },
}

impl VerificationFailure {
    /// Returns a stable failure label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HashMismatch { .. } => "hash_mismatch",
            Self::SequenceGap { .. } => "sequence_gap",
        }
    }

    fn first_broken_sequence(&self) -> u64 {
        match self {
            Self::HashMismatch { sequence_no } => *sequence_no,
            Self::SequenceGap { missing_from, .. } => *missing_from,
        }
    }
}

/// Outcome of one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Verified partition.
    pub partition_id: PartitionId,
    /// True when every checked entry is intact.
    pub valid: bool,
    /// Last sequence number certified intact, if any.
    pub verified_through: Option<u64>,
    /// First broken sequence number when verification failed.
    pub first_broken_sequence: Option<u64>,
    /// Failure reason when verification failed.
    pub reason: Option<VerificationFailure>,
    /// False when a cancellation stopped the run before the snapshot end;
    /// the next run resumes from the stored checkpoint.
    pub completed: bool,
}

/// Cooperative cancellation flag for long-running verification jobs.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation at the next batch boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Recomputes and validates the hash chain over ledger ranges.
///
/// Verification is read-only over ledger entries and safe to run
/// concurrently with appends: it certifies only up to the sequence visible
/// at call time. Failures are recorded, appended to the ledger as dedicated
/// audit events, and escalated to the notification collaborator; they are
/// never auto-corrected.
#[derive(Clone)]
pub struct IntegrityService {
    repository: Arc<dyn LedgerRepository>,
    checkpoints: Arc<dyn CheckpointRepository>,
    ledger: LedgerService,
    notifier: Arc<dyn ComplianceNotifier>,
}

impl IntegrityService {
    /// Creates a verifier over the ledger store and checkpoint table.
    #[must_use]
    pub fn new(
        repository: Arc<dyn LedgerRepository>,
        checkpoints: Arc<dyn CheckpointRepository>,
        ledger: LedgerService,
        notifier: Arc<dyn ComplianceNotifier>,
    ) -> Self {
        Self {
            repository,
            checkpoints,
            ledger,
            notifier,
        }
    }

    /// Verifies one partition's chain up to the tail visible now.
    ///
    /// Resumes from the stored checkpoint when one exists; advances the
    /// checkpoint after every intact batch so a cancelled or crashed run
    /// restarts where it left off rather than from zero.
    pub async fn verify_partition(
        &self,
        actor: &ActorIdentity,
        partition_id: PartitionId,
        cancel: Option<&CancellationFlag>,
    ) -> AppResult<VerificationReport> {
        let Some(snapshot_tail) = self.repository.tail(partition_id).await? else {
            return Ok(VerificationReport {
                partition_id,
                valid: true,
                verified_through: None,
                first_broken_sequence: None,
                reason: None,
                completed: true,
            });
        };
        let snapshot_end = snapshot_tail.sequence_no;

        let checkpoint = self.checkpoints.load(partition_id).await?;
        let (mut cursor, mut prev_hash, mut verified_through) = match checkpoint {
            Some(checkpoint) if checkpoint.sequence_no <= snapshot_end => (
                checkpoint.sequence_no + 1,
                checkpoint.entry_hash,
                Some(checkpoint.sequence_no),
            ),
            _ => (0, GENESIS_HASH.to_owned(), None),
        };

        while cursor <= snapshot_end {
            if let Some(cancel) = cancel
                && cancel.is_cancelled()
            {
                info!(
                    partition_id = %partition_id,
                    resumed_at = cursor,
                    "verification cancelled between batches"
                );
                return Ok(VerificationReport {
                    partition_id,
                    valid: true,
                    verified_through,
                    first_broken_sequence: None,
                    reason: None,
                    completed: false,
                });
            }

            let batch_end = snapshot_end.min(cursor.saturating_add(VERIFY_BATCH_SIZE - 1));
            let batch = self
                .repository
                .entries_in_range(partition_id, cursor, batch_end)
                .await?;

            let mut expected = cursor;
            for entry in &batch {
                if entry.sequence_no() != expected {
                    let failure = VerificationFailure::SequenceGap {
                        missing_from: expected,
                        missing_to: entry.sequence_no() - 1,
                    };
                    return self
                        .fail(actor, partition_id, snapshot_end, verified_through, failure)
                        .await;
                }

                if entry.prev_hash() != prev_hash || !entry.hash_is_consistent() {
                    let failure = VerificationFailure::HashMismatch {
                        sequence_no: entry.sequence_no(),
                    };
                    return self
                        .fail(actor, partition_id, snapshot_end, verified_through, failure)
                        .await;
                }

                prev_hash = entry.this_hash().to_owned();
                expected += 1;
            }

            if expected <= batch_end {
                let failure = VerificationFailure::SequenceGap {
                    missing_from: expected,
                    missing_to: batch_end,
                };
                return self
                    .fail(actor, partition_id, snapshot_end, verified_through, failure)
                    .await;
            }

            verified_through = Some(batch_end);
            self.checkpoints
                .store(VerificationCheckpoint {
                    partition_id,
                    sequence_no: batch_end,
                    entry_hash: prev_hash.clone(),
                })
                .await?;
            cursor = batch_end + 1;
        }

        info!(
            partition_id = %partition_id,
            verified_through = snapshot_end,
            "ledger chain verified"
        );

        Ok(VerificationReport {
            partition_id,
            valid: true,
            verified_through,
            first_broken_sequence: None,
            reason: None,
            completed: true,
        })
    }

    /// Produces a standalone custody-integrity proof for one evidence item:
    /// re-hashes every evidence-scoped ledger entry from its stored fields.
    pub async fn verify_evidence(
        &self,
        partition_id: PartitionId,
        evidence_id: EvidenceId,
    ) -> AppResult<VerificationReport> {
        let entries = self
            .repository
            .entries_for_entity(partition_id, "evidence", evidence_id.to_string().as_str())
            .await?;

        let mut verified_through = None;
        for entry in &entries {
            if !entry.hash_is_consistent() {
                return Ok(VerificationReport {
                    partition_id,
                    valid: false,
                    verified_through,
                    first_broken_sequence: Some(entry.sequence_no()),
                    reason: Some(VerificationFailure::HashMismatch {
                        sequence_no: entry.sequence_no(),
                    }),
                    completed: true,
                });
            }
            verified_through = Some(entry.sequence_no());
        }

        Ok(VerificationReport {
            partition_id,
            valid: true,
            verified_through,
            first_broken_sequence: None,
            reason: None,
            completed: true,
        })
    }

    /// Marks the affected range unverified, appends the dedicated audit
    /// event, escalates to the notification collaborator, and returns the
    /// failing report. Appends continue to be accepted on the partition.
    async fn fail(
        &self,
        actor: &ActorIdentity,
        partition_id: PartitionId,
        snapshot_end: u64,
        verified_through: Option<u64>,
        failure: VerificationFailure,
    ) -> AppResult<VerificationReport> {
        let first_broken = failure.first_broken_sequence();
        let reason = failure.as_str();
        warn!(
            partition_id = %partition_id,
            first_broken_sequence = first_broken,
            reason,
            "ledger verification failed"
        );

        let already_reported = self
            .checkpoints
            .list_broken_ranges()
            .await?
            .iter()
            .any(|range| {
                range.partition_id == partition_id && range.from_sequence == first_broken
            });

        self.checkpoints
            .record_broken_range(BrokenRange {
                partition_id,
                from_sequence: first_broken,
                to_sequence: snapshot_end,
                reason: reason.to_owned(),
            })
            .await?;

        if already_reported {
            // A later sweep over the same break re-reports the range but
            // does not grow the ledger or re-page the collaborator.
            return Ok(VerificationReport {
                partition_id,
                valid: false,
                verified_through,
                first_broken_sequence: Some(first_broken),
                reason: Some(failure),
                completed: true,
            });
        }

        if let Err(error) = self
            .ledger
            .append(
                actor,
                LedgerAppendRequest {
                    partition_id,
                    action: AuditAction::IntegrityFailureRecorded,
                    entity_type: "ledger_partition".to_owned(),
                    entity_id: partition_id.to_string(),
                    payload: json!({
                        "reason": reason,
                        "first_broken_sequence": first_broken,
                        "snapshot_end": snapshot_end,
                    }),
                },
            )
            .await
        {
            warn!(
                partition_id = %partition_id,
                error = %error,
                "failed to append integrity failure audit event"
            );
        }

        dispatch_best_effort(
            self.notifier.as_ref(),
            ComplianceEvent::IntegrityFailure {
                partition_id,
                sequence_no: Some(first_broken),
                reason: reason.to_owned(),
            },
        )
        .await;

        Ok(VerificationReport {
            partition_id,
            valid: false,
            verified_through,
            first_broken_sequence: Some(first_broken),
            reason: Some(failure),
            completed: true,
        })
    }
}
