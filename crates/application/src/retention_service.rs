use std::sync::Arc;

use chrono::{DateTime, Utc};
use custodia_core::{ActorIdentity, AppError, AppResult, EvidenceId};
use custodia_domain::{
    AuditAction, Disposition, EvidenceItem, HoldScope, LegalHold, LegalHoldId, RetentionAction,
    RetentionAnchor, RetentionDecision, RetentionPolicy,
};
use serde_json::json;
use tracing::{debug, info};

use crate::custody_ports::{CustodyRepository, EvidenceRepository};
use crate::ledger_ports::LedgerAppendRequest;
use crate::ledger_service::LedgerService;
use crate::notify::{ComplianceEvent, ComplianceNotifier, dispatch_best_effort};
use crate::retention_ports::{LegalHoldRepository, RetentionPolicyRepository};

#[cfg(test)]
mod tests;

/// One due lifecycle action on the scheduler worklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionWorkItem {
    /// Evidence item the action applies to.
    pub evidence_id: EvidenceId,
    /// Due lifecycle action.
    pub action: RetentionAction,
    /// When the action became due.
    pub due_at: DateTime<Utc>,
}

/// Internal assessment separating the computed action from hold suppression.
pub(crate) struct RetentionAssessment {
    pub(crate) decision: RetentionDecision,
    pub(crate) suppressed_by: Option<LegalHoldId>,
    pub(crate) computed_action: RetentionAction,
}

/// Computes due archival/deletion actions per evidence item.
///
/// Evaluation is idempotent: re-evaluating an already-archived or disposed
/// item yields `None`. An active hold forces `None` regardless of the
/// computed due date, and that suppression is itself appended to the ledger
/// so it stays visible for compliance.
#[derive(Clone)]
pub struct RetentionService {
    evidence: Arc<dyn EvidenceRepository>,
    custody: Arc<dyn CustodyRepository>,
    policies: Arc<dyn RetentionPolicyRepository>,
    holds: Arc<dyn LegalHoldRepository>,
    ledger: LedgerService,
    notifier: Arc<dyn ComplianceNotifier>,
}

impl RetentionService {
    /// Creates a retention engine over the compliance repositories.
    #[must_use]
    pub fn new(
        evidence: Arc<dyn EvidenceRepository>,
        custody: Arc<dyn CustodyRepository>,
        policies: Arc<dyn RetentionPolicyRepository>,
        holds: Arc<dyn LegalHoldRepository>,
        ledger: LedgerService,
        notifier: Arc<dyn ComplianceNotifier>,
    ) -> Self {
        Self {
            evidence,
            custody,
            policies,
            holds,
            ledger,
            notifier,
        }
    }

    /// Evaluates one item against its policy as of the given instant.
    ///
    /// A suppressed action appends a `retention.suppressed_by_hold` audit
    /// entry; a suppressed deletion additionally escalates to the
    /// notification collaborator. Due actions dispatch `RetentionDue`.
    pub async fn evaluate(
        &self,
        actor: &ActorIdentity,
        evidence_id: EvidenceId,
        as_of: DateTime<Utc>,
    ) -> AppResult<RetentionDecision> {
        let Some(item) = self.evidence.find(evidence_id).await? else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' is not registered"
            )));
        };

        let assessment = self.assess(&item, as_of).await?;

        if let Some(hold_id) = assessment.suppressed_by {
            self.ledger
                .append(
                    actor,
                    LedgerAppendRequest {
                        partition_id: item.partition_id(),
                        action: AuditAction::RetentionSuppressed,
                        entity_type: "evidence".to_owned(),
                        entity_id: evidence_id.to_string(),
                        payload: json!({
                            "suppressed_action": assessment.computed_action.as_str(),
                            "hold_id": hold_id.to_string(),
                            "due_at": assessment.decision.due_at.map(|value| value.to_rfc3339()),
                        }),
                    },
                )
                .await?;

            if assessment.computed_action == RetentionAction::Delete {
                dispatch_best_effort(
                    self.notifier.as_ref(),
                    ComplianceEvent::LegalHoldBlockedDisposal {
                        evidence_id,
                        hold_id,
                    },
                )
                .await;
            }

            debug!(
                evidence_id = %evidence_id,
                suppressed_action = assessment.computed_action.as_str(),
                hold_id = %hold_id,
                "retention action suppressed by active legal hold"
            );
        } else if assessment.decision.action != RetentionAction::None {
            if let Some(due_at) = assessment.decision.due_at {
                dispatch_best_effort(
                    self.notifier.as_ref(),
                    ComplianceEvent::RetentionDue {
                        evidence_id,
                        action: assessment.decision.action,
                        due_at,
                    },
                )
                .await;
            }
        }

        Ok(assessment.decision)
    }

    /// Produces the periodic scheduler worklist: every item whose lifecycle
    /// action is due as of the given instant, keyed by evidence id.
    ///
    /// Scanning is idempotent; executing the worklist through the archival
    /// executor re-checks every precondition, so crash-and-retry never
    /// double-executes an irreversible disposal.
    pub async fn scan(
        &self,
        actor: &ActorIdentity,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<RetentionWorkItem>> {
        let mut worklist = Vec::new();

        for disposition in [Disposition::Active, Disposition::Archived] {
            let items = self.evidence.list_by_disposition(disposition, limit).await?;
            for item in items {
                let decision = self.evaluate(actor, item.id(), as_of).await?;
                if decision.action != RetentionAction::None
                    && let Some(due_at) = decision.due_at
                {
                    worklist.push(RetentionWorkItem {
                        evidence_id: item.id(),
                        action: decision.action,
                        due_at,
                    });
                }
            }
        }

        worklist.sort_by_key(|work_item| (work_item.due_at, work_item.evidence_id));
        worklist.truncate(limit);

        info!(due_count = worklist.len(), "retention scan completed");
        Ok(worklist)
    }

    /// Places a legal hold and appends it to the ledger.
    pub async fn place_hold(
        &self,
        actor: &ActorIdentity,
        scope: HoldScope,
        reason: impl Into<String>,
        placed_at: DateTime<Utc>,
    ) -> AppResult<LegalHold> {
        let partition_id = match scope {
            HoldScope::Evidence { evidence_id } => {
                let Some(item) = self.evidence.find(evidence_id).await? else {
                    return Err(AppError::NotFound(format!(
                        "evidence '{evidence_id}' is not registered"
                    )));
                };
                item.partition_id()
            }
            HoldScope::Case { partition_id } => partition_id,
        };

        let hold = LegalHold::new(
            LegalHoldId::new(),
            scope,
            reason,
            actor.subject(),
            placed_at,
        )?;
        self.holds.save(&hold).await?;

        self.ledger
            .append(
                actor,
                LedgerAppendRequest {
                    partition_id,
                    action: AuditAction::LegalHoldPlaced,
                    entity_type: "legal_hold".to_owned(),
                    entity_id: hold.id().to_string(),
                    payload: json!({
                        "scope": scope,
                        "reason": hold.reason(),
                    }),
                },
            )
            .await?;

        info!(hold_id = %hold.id(), "legal hold placed");
        Ok(hold)
    }

    /// Releases a legal hold and appends the release to the ledger.
    pub async fn release_hold(
        &self,
        actor: &ActorIdentity,
        hold_id: LegalHoldId,
        released_at: DateTime<Utc>,
    ) -> AppResult<LegalHold> {
        let Some(mut hold) = self.holds.find(hold_id).await? else {
            return Err(AppError::NotFound(format!(
                "legal hold '{hold_id}' does not exist"
            )));
        };

        hold.release(released_at)?;
        self.holds.save(&hold).await?;

        let partition_id = match hold.scope() {
            HoldScope::Evidence { evidence_id } => {
                let Some(item) = self.evidence.find(evidence_id).await? else {
                    return Err(AppError::NotFound(format!(
                        "evidence '{evidence_id}' is not registered"
                    )));
                };
                item.partition_id()
            }
            HoldScope::Case { partition_id } => partition_id,
        };

        self.ledger
            .append(
                actor,
                LedgerAppendRequest {
                    partition_id,
                    action: AuditAction::LegalHoldReleased,
                    entity_type: "legal_hold".to_owned(),
                    entity_id: hold.id().to_string(),
                    payload: json!({
                        "released_at": released_at.to_rfc3339(),
                    }),
                },
            )
            .await?;

        info!(hold_id = %hold.id(), "legal hold released");
        Ok(hold)
    }

    /// Computes the would-be decision without recording side effects.
    ///
    /// Suppression by an active hold is applied; the assessment keeps the
    /// pre-suppression action so callers can report on it.
    pub(crate) async fn assess(
        &self,
        item: &EvidenceItem,
        as_of: DateTime<Utc>,
    ) -> AppResult<RetentionAssessment> {
        if item.disposition() == Disposition::Disposed {
            return Ok(RetentionAssessment {
                decision: RetentionDecision::none(),
                suppressed_by: None,
                computed_action: RetentionAction::None,
            });
        }

        let Some(policy) = self.policies.find(item.retention_policy_id()).await? else {
            return Err(AppError::NotFound(format!(
                "retention policy '{}' does not exist",
                item.retention_policy_id()
            )));
        };

        let anchor_time = self.anchor_time(item, &policy).await?;
        let Some(due_at) = policy.due_at(anchor_time) else {
            return Ok(RetentionAssessment {
                decision: RetentionDecision::none(),
                suppressed_by: None,
                computed_action: RetentionAction::None,
            });
        };

        if as_of < due_at {
            return Ok(RetentionAssessment {
                decision: RetentionDecision {
                    action: RetentionAction::None,
                    due_at: Some(due_at),
                },
                suppressed_by: None,
                computed_action: RetentionAction::None,
            });
        }

        let computed_action = self.due_action(item, &policy).await?;
        if computed_action == RetentionAction::None {
            return Ok(RetentionAssessment {
                decision: RetentionDecision {
                    action: RetentionAction::None,
                    due_at: Some(due_at),
                },
                suppressed_by: None,
                computed_action,
            });
        }

        let holds = self
            .holds
            .active_holds_for(item.id(), item.partition_id())
            .await?;
        if let Some(hold) = holds.first() {
            return Ok(RetentionAssessment {
                decision: RetentionDecision {
                    action: RetentionAction::None,
                    due_at: Some(due_at),
                },
                suppressed_by: Some(hold.id()),
                computed_action,
            });
        }

        Ok(RetentionAssessment {
            decision: RetentionDecision {
                action: computed_action,
                due_at: Some(due_at),
            },
            suppressed_by: None,
            computed_action,
        })
    }

    async fn anchor_time(
        &self,
        item: &EvidenceItem,
        policy: &RetentionPolicy,
    ) -> AppResult<DateTime<Utc>> {
        match policy.anchor() {
            RetentionAnchor::EvidenceRegistered => Ok(item.registered_at()),
            RetentionAnchor::LastCustodyAction => Ok(self
                .custody
                .last_entry(item.id())
                .await?
                .map_or(item.registered_at(), |entry| entry.occurred_at())),
        }
    }

    /// The action a due item is eligible for, before hold suppression.
    ///
    /// Deletion requires a terminal custody state; a due deletion on a
    /// non-terminal item stays `None` until custody reaches a terminal
    /// state.
    async fn due_action(
        &self,
        item: &EvidenceItem,
        policy: &RetentionPolicy,
    ) -> AppResult<RetentionAction> {
        match item.disposition() {
            Disposition::Active if policy.auto_archive() => Ok(RetentionAction::Archive),
            Disposition::Active | Disposition::Archived if policy.auto_delete() => {
                let terminal = self
                    .custody
                    .last_entry(item.id())
                    .await?
                    .is_some_and(|entry| entry.action().resulting_state().is_terminal());
                Ok(if terminal {
                    RetentionAction::Delete
                } else {
                    RetentionAction::None
                })
            }
            _ => Ok(RetentionAction::None),
        }
    }
}
