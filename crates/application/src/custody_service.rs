use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use custodia_core::{ActorIdentity, AppError, AppResult, EvidenceId};
use custodia_domain::{
    AuditAction, CustodyAction, CustodyEntry, CustodyEntryInput, CustodyRuleRegistry, CustodyState,
    EvidenceItem, EvidenceItemInput, GapFinding, analyze_sequence,
};
use serde_json::json;
use tracing::info;

use crate::archival_ports::{EvidenceLock, EvidenceLockCoordinator};
use crate::custody_ports::{CustodyRepository, EvidenceRepository};
use crate::ledger_ports::LedgerAppendRequest;
use crate::ledger_service::LedgerService;
use crate::notify::{ComplianceEvent, ComplianceNotifier, dispatch_best_effort};
use crate::retention_ports::LegalHoldRepository;


/// Lease length for the per-evidence transition lock.
const TRANSITION_LOCK_SECONDS: u32 = 30;

/// How continuity findings affect an incoming transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapEnforcement {
    /// Findings are surfaced to the notification collaborator and the
    /// transition proceeds. Default: legitimate multi-party handoffs are
    /// sometimes logged after the fact.
    Flag,
    /// Findings reject the transition unless the caller acknowledges them.
    Block,
}

/// Gap detection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapPolicy {
    /// Largest inter-entry gap tolerated without a note.
    pub max_silent_gap: Duration,
    /// Enforcement strictness.
    pub enforcement: GapEnforcement,
}

impl Default for GapPolicy {
    fn default() -> Self {
        Self {
            max_silent_gap: Duration::hours(1),
            enforcement: GapEnforcement::Flag,
        }
    }
}

/// Request to record one custody transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionInput {
    /// Evidence item being transitioned.
    pub evidence_id: EvidenceId,
    /// Custody action to record.
    pub action: CustodyAction,
    /// Custodian physically releasing the item, as logged by the recorder.
    pub from_custodian: Option<String>,
    /// Custodian receiving the item; required for non-terminal actions.
    pub to_custodian: Option<String>,
    /// Location the item leaves.
    pub from_location: Option<String>,
    /// Location the item arrives at.
    pub to_location: Option<String>,
    /// When the action physically occurred.
    pub occurred_at: DateTime<Utc>,
    /// Optional note, e.g. explaining a delayed handoff.
    pub note: Option<String>,
    /// Explicit acknowledgement of continuity findings under `Block`
    /// enforcement.
    pub acknowledge_findings: bool,
}

/// Enforces valid evidence-state transitions and writes them through the
/// tamper-evident ledger.
///
/// Custody is a continuity-checked projection over the ledger, not a
/// separate unaudited table: every accepted transition appends a
/// `custody.recorded` audit entry and a custody entry. Transitions on one
/// item are serialized through the evidence lock; transitions on different
/// items proceed independently.
#[derive(Clone)]
pub struct CustodyService {
    custody: Arc<dyn CustodyRepository>,
    evidence: Arc<dyn EvidenceRepository>,
    holds: Arc<dyn LegalHoldRepository>,
    locks: Arc<dyn EvidenceLockCoordinator>,
    ledger: LedgerService,
    notifier: Arc<dyn ComplianceNotifier>,
    rules: Arc<CustodyRuleRegistry>,
    gap_policy: GapPolicy,
    holder_id: String,
}

impl CustodyService {
    /// Creates a custody service with the default rule registry and gap
    /// policy.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        custody: Arc<dyn CustodyRepository>,
        evidence: Arc<dyn EvidenceRepository>,
        holds: Arc<dyn LegalHoldRepository>,
        locks: Arc<dyn EvidenceLockCoordinator>,
        ledger: LedgerService,
        notifier: Arc<dyn ComplianceNotifier>,
        holder_id: impl Into<String>,
    ) -> Self {
        Self {
            custody,
            evidence,
            holds,
            locks,
            ledger,
            notifier,
            rules: Arc::new(CustodyRuleRegistry::new()),
            gap_policy: GapPolicy::default(),
            holder_id: holder_id.into(),
        }
    }

    /// Replaces the custody rule registry.
    #[must_use]
    pub fn with_rules(mut self, rules: CustodyRuleRegistry) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    /// Replaces the gap detection policy.
    #[must_use]
    pub fn with_gap_policy(mut self, gap_policy: GapPolicy) -> Self {
        self.gap_policy = gap_policy;
        self
    }

    /// Registers an evidence item supplied by the registry collaborator and
    /// appends the registration to the ledger.
    pub async fn register_evidence(
        &self,
        actor: &ActorIdentity,
        input: EvidenceItemInput,
    ) -> AppResult<EvidenceItem> {
        let item = EvidenceItem::new(input)?;
        self.evidence.register(&item).await?;

        self.ledger
            .append(
                actor,
                LedgerAppendRequest {
                    partition_id: item.partition_id(),
                    action: AuditAction::EvidenceRegistered,
                    entity_type: "evidence".to_owned(),
                    entity_id: item.id().to_string(),
                    payload: json!({
                        "category": item.category(),
                        "retention_policy_id": item.retention_policy_id().to_string(),
                    }),
                },
            )
            .await?;

        info!(evidence_id = %item.id(), category = item.category(), "evidence registered");
        Ok(item)
    }

    /// Returns the current custody state of one item, if it has any entries.
    pub async fn current_state(&self, evidence_id: EvidenceId) -> AppResult<Option<CustodyState>> {
        Ok(self
            .custody
            .last_entry(evidence_id)
            .await?
            .map(|entry| entry.action().resulting_state()))
    }

    /// Records one custody transition.
    ///
    /// Rejected with `InvalidTransition` when the action is not permitted
    /// from the current state, when the receiving custodian is missing for
    /// a non-terminal action, or when continuity findings exist under
    /// `Block` enforcement without acknowledgement. `Disposed` under an
    /// active hold is rejected with `LegalHoldViolation`. A contending
    /// writer receives `ConcurrentModification` and retries against the
    /// updated state.
    pub async fn record_transition(
        &self,
        actor: &ActorIdentity,
        input: TransitionInput,
    ) -> AppResult<CustodyEntry> {
        let evidence_id = input.evidence_id;
        let Some(item) = self.evidence.find(evidence_id).await? else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' is not registered"
            )));
        };

        let Some(lock) = self
            .locks
            .try_acquire(evidence_id, self.holder_id.as_str(), TRANSITION_LOCK_SECONDS)
            .await?
        else {
            return Err(AppError::ConcurrentModification(format!(
                "a transition or lifecycle action is in flight for evidence '{evidence_id}'"
            )));
        };

        let result = self.record_locked(actor, &item, input).await;
        self.release_lock(&lock).await;
        result
    }

    /// Re-analyzes the full custody sequence of one item on demand.
    ///
    /// Findings are surfaced to the notification collaborator, never
    /// silently dropped.
    pub async fn audit_custody(&self, evidence_id: EvidenceId) -> AppResult<Vec<GapFinding>> {
        let entries = self.custody.entries_for_evidence(evidence_id).await?;
        let findings = analyze_sequence(&entries, self.gap_policy.max_silent_gap);

        if !findings.is_empty() {
            dispatch_best_effort(
                self.notifier.as_ref(),
                ComplianceEvent::GapDetected {
                    evidence_id,
                    findings: findings.clone(),
                },
            )
            .await;
        }

        Ok(findings)
    }

    /// Returns the full custody sequence for one item.
    pub async fn custody_history(&self, evidence_id: EvidenceId) -> AppResult<Vec<CustodyEntry>> {
        self.custody.entries_for_evidence(evidence_id).await
    }

    async fn record_locked(
        &self,
        actor: &ActorIdentity,
        item: &EvidenceItem,
        input: TransitionInput,
    ) -> AppResult<CustodyEntry> {
        let TransitionInput {
            evidence_id,
            action,
            from_custodian,
            to_custodian,
            from_location,
            to_location,
            occurred_at,
            note,
            acknowledge_findings,
        } = input;

        let last = self.custody.last_entry(evidence_id).await?;
        let prior_state = last.as_ref().map(|entry| entry.action().resulting_state());

        let rules = self.rules.rules_for(item.category());
        if !rules.allows(action, prior_state) {
            return Err(AppError::InvalidTransition(format!(
                "custody action '{}' is not permitted from state '{}'",
                action.as_str(),
                prior_state.map_or("<none>", |state| state.as_str()),
            )));
        }

        if action == CustodyAction::Disposed {
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
        }

        let sequence_no = last
            .as_ref()
            .map_or(0, |entry| entry.sequence_no() + 1);
        let entry = CustodyEntry::new(
            evidence_id,
            sequence_no,
            actor.subject(),
            CustodyEntryInput {
                action,
                from_custodian,
                to_custodian,
                from_location,
                to_location,
                occurred_at,
                note,
            },
        )?;

        if let Some(last) = last.as_ref() {
            let window = [last.clone(), entry.clone()];
            let findings = analyze_sequence(&window, self.gap_policy.max_silent_gap);
            if !findings.is_empty() {
                dispatch_best_effort(
                    self.notifier.as_ref(),
                    ComplianceEvent::GapDetected {
                        evidence_id,
                        findings: findings.clone(),
                    },
                )
                .await;

                if self.gap_policy.enforcement == GapEnforcement::Block && !acknowledge_findings {
                    return Err(AppError::InvalidTransition(format!(
                        "{} continuity finding(s) require explicit acknowledgement",
                        findings.len()
                    )));
                }
            }
        }

        self.ledger
            .append(
                actor,
                LedgerAppendRequest {
                    partition_id: item.partition_id(),
                    action: AuditAction::CustodyRecorded,
                    entity_type: "evidence".to_owned(),
                    entity_id: evidence_id.to_string(),
                    payload: json!({
                        "custody_sequence_no": entry.sequence_no(),
                        "action": entry.action().as_str(),
                        "from_custodian": entry.from_custodian(),
                        "to_custodian": entry.to_custodian(),
                        "from_location": entry.from_location(),
                        "to_location": entry.to_location(),
                        "occurred_at": entry.occurred_at().to_rfc3339(),
                        "note": entry.note(),
                    }),
                },
            )
            .await?;

        match self.custody.insert(&entry).await {
            Ok(()) => {}
            Err(AppError::Conflict(reason)) => {
                return Err(AppError::ConcurrentModification(reason));
            }
            Err(error) => return Err(error),
        }

        info!(
            evidence_id = %evidence_id,
            sequence_no = entry.sequence_no(),
            action = entry.action().as_str(),
            state = entry.action().resulting_state().as_str(),
            "custody transition recorded"
        );

        Ok(entry)
    }

    async fn release_lock(&self, lock: &EvidenceLock) {
        if let Err(error) = self.locks.release(lock).await {
            tracing::warn!(
                evidence_id = %lock.evidence_id,
                error = %error,
                "failed to release evidence lock; it will expire with its lease"
            );
        }
    }
}
