use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custodia_core::{AppResult, EvidenceId, PartitionId};
use custodia_domain::{GapFinding, LegalHoldId, RetentionAction};
use serde::Serialize;

/// Event published to the notification collaborator.
///
/// Dispatch happens only after a durable append, is at-least-once, and can
/// never roll back a committed entry; consumers are expected to be
/// idempotent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComplianceEvent {
    /// Custody continuity findings were detected for an item.
    GapDetected {
        /// Affected evidence item.
        evidence_id: EvidenceId,
        /// Findings surfaced by the analysis.
        findings: Vec<GapFinding>,
    },
    /// Chain verification or content re-verification failed.
    IntegrityFailure {
        /// Affected partition.
        partition_id: PartitionId,
        /// Offending sequence number when known.
        sequence_no: Option<u64>,
        /// Failure description.
        reason: String,
    },
    /// An active legal hold blocked a disposal or suppressed a due deletion.
    LegalHoldBlockedDisposal {
        /// Affected evidence item.
        evidence_id: EvidenceId,
        /// Blocking hold.
        hold_id: LegalHoldId,
    },
    /// A retention action came due for an item.
    RetentionDue {
        /// Affected evidence item.
        evidence_id: EvidenceId,
        /// Due lifecycle action.
        action: RetentionAction,
        /// When the action became due.
        due_at: DateTime<Utc>,
    },
}

impl ComplianceEvent {
    /// Returns a stable event kind label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GapDetected { .. } => "gap_detected",
            Self::IntegrityFailure { .. } => "integrity_failure",
            Self::LegalHoldBlockedDisposal { .. } => "legal_hold_blocked_disposal",
            Self::RetentionDue { .. } => "retention_due",
        }
    }
}

/// Port for dispatching compliance events to the notification collaborator.
#[async_trait]
pub trait ComplianceNotifier: Send + Sync {
    /// Dispatches one event; delivery is at-least-once.
    async fn dispatch(&self, event: ComplianceEvent) -> AppResult<()>;
}

/// Dispatches an event without letting a delivery failure reach the write
/// path; a committed entry is never rolled back because a notification
/// could not be sent.
pub(crate) async fn dispatch_best_effort(notifier: &dyn ComplianceNotifier, event: ComplianceEvent) {
    let kind = event.kind();
    if let Err(error) = notifier.dispatch(event).await {
        tracing::warn!(event_kind = kind, error = %error, "compliance event dispatch failed");
    }
}
