use std::sync::Arc;

use chrono::{Duration, Utc};
use custodia_core::{ActorIdentity, EvidenceId, PartitionId};
use custodia_domain::{
    CustodyAction, CustodyEntry, CustodyEntryInput, Disposition, EvidenceItem, EvidenceItemInput,
    HoldScope, RetentionAction, RetentionAnchor, RetentionPeriod, RetentionPolicy,
    RetentionPolicyId, RetentionPolicyInput,
};

use crate::custody_ports::{CustodyRepository, EvidenceRepository};
use crate::ledger_ports::LedgerRepository;
use crate::ledger_service::LedgerService;
use crate::retention_ports::RetentionPolicyRepository;
use crate::test_support::{
    FakeCustodyRepository, FakeEvidenceRepository, FakeHoldRepository, FakeLedgerRepository,
    FakePolicyRepository, RecordingNotifier,
};

use super::RetentionService;

struct Fixture {
    ledger_repository: Arc<FakeLedgerRepository>,
    evidence: Arc<FakeEvidenceRepository>,
    custody: Arc<FakeCustodyRepository>,
    policies: Arc<FakePolicyRepository>,
    notifier: Arc<RecordingNotifier>,
    service: RetentionService,
}

fn fixture() -> Fixture {
    let ledger_repository = Arc::new(FakeLedgerRepository::new());
    let evidence = Arc::new(FakeEvidenceRepository::new());
    let custody = Arc::new(FakeCustodyRepository::new());
    let policies = Arc::new(FakePolicyRepository::new());
    let holds = Arc::new(FakeHoldRepository::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let service = RetentionService::new(
        evidence.clone(),
        custody.clone(),
        policies.clone(),
        holds.clone(),
        LedgerService::new(ledger_repository.clone()),
        notifier.clone(),
    );

    Fixture {
        ledger_repository,
        evidence,
        custody,
        policies,
        notifier,
        service,
    }
}

fn actor() -> ActorIdentity {
    ActorIdentity::new("custodia.scheduler", "Retention Scheduler").unwrap_or_else(|_| unreachable!())
}

async fn save_policy(
    fixture: &Fixture,
    period: RetentionPeriod,
    auto_archive: bool,
    auto_delete: bool,
) -> RetentionPolicyId {
    let policy_id = RetentionPolicyId::new();
    let Ok(policy) = RetentionPolicy::new(RetentionPolicyInput {
        id: policy_id,
        entity_type: "evidence".to_owned(),
        period,
        anchor: RetentionAnchor::EvidenceRegistered,
        auto_archive,
        auto_delete,
    }) else {
        unreachable!();
    };
    assert!(fixture.policies.save(&policy).await.is_ok());
    policy_id
}

async fn register_item(fixture: &Fixture, policy_id: RetentionPolicyId, age_days: i64) -> EvidenceId {
    let evidence_id = EvidenceId::new();
    let Ok(item) = EvidenceItem::new(EvidenceItemInput {
        id: evidence_id,
        partition_id: PartitionId::new(),
        category: "document".to_owned(),
        storage_ref: "blob://primary/1".to_owned(),
        retention_policy_id: policy_id,
        registered_at: Utc::now() - Duration::days(age_days),
    }) else {
        unreachable!();
    };
    assert!(fixture.evidence.register(&item).await.is_ok());
    evidence_id
}

async fn record_custody(fixture: &Fixture, evidence_id: EvidenceId, action: CustodyAction, seq: u64) {
    let Ok(entry) = CustodyEntry::new(
        evidence_id,
        seq,
        "officer.doe",
        CustodyEntryInput {
            action,
            from_custodian: (seq > 0).then(|| "custodian-a".to_owned()),
            to_custodian: (!action.resulting_state().is_terminal())
                .then(|| "custodian-a".to_owned()),
            from_location: (seq > 0).then(|| "vault-1".to_owned()),
            to_location: Some("vault-1".to_owned()),
            occurred_at: Utc::now(),
            note: None,
        },
    ) else {
        unreachable!();
    };
    assert!(fixture.custody.insert(&entry).await.is_ok());
}

#[tokio::test]
async fn item_before_due_date_is_not_actionable() {
    let fixture = fixture();
    let policy_id = save_policy(&fixture, RetentionPeriod::Fixed { days: 30 }, true, false).await;
    let evidence_id = register_item(&fixture, policy_id, 10).await;

    let Ok(decision) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };

    assert_eq!(decision.action, RetentionAction::None);
    assert!(decision.due_at.is_some());
    assert!(fixture.notifier.kinds().await.is_empty());
}

#[tokio::test]
async fn due_item_is_archived_eligible() {
    let fixture = fixture();
    let policy_id = save_policy(&fixture, RetentionPeriod::Fixed { days: 30 }, true, false).await;
    let evidence_id = register_item(&fixture, policy_id, 45).await;

    let Ok(decision) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };

    assert_eq!(decision.action, RetentionAction::Archive);
    assert_eq!(fixture.notifier.kinds().await, vec!["retention_due"]);
}

#[tokio::test]
async fn permanent_period_never_expires() {
    let fixture = fixture();
    let policy_id = save_policy(&fixture, RetentionPeriod::Permanent, true, true).await;
    let evidence_id = register_item(&fixture, policy_id, 10_000).await;

    let Ok(decision) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };

    assert_eq!(decision.action, RetentionAction::None);
    assert!(decision.due_at.is_none());
}

#[tokio::test]
async fn evaluation_is_idempotent_for_archived_items() {
    let fixture = fixture();
    let policy_id = save_policy(&fixture, RetentionPeriod::Fixed { days: 30 }, true, false).await;
    let evidence_id = register_item(&fixture, policy_id, 45).await;
    let updated = fixture
        .evidence
        .update_disposition(evidence_id, Disposition::Archived)
        .await;
    assert!(updated.is_ok());

    for _ in 0..2 {
        let Ok(decision) = fixture
            .service
            .evaluate(&actor(), evidence_id, Utc::now())
            .await
        else {
            unreachable!();
        };
        assert_eq!(decision.action, RetentionAction::None);
    }
}

#[tokio::test]
async fn active_hold_suppresses_due_action_and_is_ledgered() {
    let fixture = fixture();
    let policy_id = save_policy(&fixture, RetentionPeriod::Fixed { days: 30 }, true, false).await;
    let evidence_id = register_item(&fixture, policy_id, 45).await;

    let placed = fixture
        .service
        .place_hold(
            &actor(),
            HoldScope::Evidence { evidence_id },
            "pending litigation",
            Utc::now(),
        )
        .await;
    assert!(placed.is_ok());

    let Ok(decision) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };
    assert_eq!(decision.action, RetentionAction::None);

    // hold placement + suppression entry are both on the ledger.
    let count = fixture
        .ledger_repository
        .count_entries()
        .await
        .unwrap_or_default();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn suppressed_deletion_escalates_to_notifier() {
    let fixture = fixture();
    let policy_id = save_policy(&fixture, RetentionPeriod::Fixed { days: 30 }, false, true).await;
    let evidence_id = register_item(&fixture, policy_id, 45).await;
    record_custody(&fixture, evidence_id, CustodyAction::Seized, 0).await;
    record_custody(&fixture, evidence_id, CustodyAction::Returned, 1).await;

    let placed = fixture
        .service
        .place_hold(
            &actor(),
            HoldScope::Evidence { evidence_id },
            "pending litigation",
            Utc::now(),
        )
        .await;
    assert!(placed.is_ok());

    let Ok(decision) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };

    assert_eq!(decision.action, RetentionAction::None);
    assert_eq!(
        fixture.notifier.kinds().await,
        vec!["legal_hold_blocked_disposal"]
    );
}

#[tokio::test]
async fn deletion_waits_for_terminal_custody_state() {
    let fixture = fixture();
    let policy_id = save_policy(&fixture, RetentionPeriod::Fixed { days: 30 }, false, true).await;
    let evidence_id = register_item(&fixture, policy_id, 45).await;
    record_custody(&fixture, evidence_id, CustodyAction::Seized, 0).await;

    let Ok(non_terminal) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };
    assert_eq!(non_terminal.action, RetentionAction::None);

    record_custody(&fixture, evidence_id, CustodyAction::Returned, 1).await;
    let Ok(terminal) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };
    assert_eq!(terminal.action, RetentionAction::Delete);
}

#[tokio::test]
async fn hold_lifecycle_drives_the_seizure_to_deletion_scenario() {
    let fixture = fixture();
    let policy_id = save_policy(&fixture, RetentionPeriod::Fixed { days: 30 }, false, true).await;
    let evidence_id = register_item(&fixture, policy_id, 45).await;

    // Seized by A at Vault1, transferred to B, analyzed by B.
    record_custody(&fixture, evidence_id, CustodyAction::Seized, 0).await;
    record_custody(&fixture, evidence_id, CustodyAction::Transferred, 1).await;
    record_custody(&fixture, evidence_id, CustodyAction::Analyzed, 2).await;

    let Ok(hold) = fixture
        .service
        .place_hold(
            &actor(),
            HoldScope::Evidence { evidence_id },
            "pending litigation",
            Utc::now(),
        )
        .await
    else {
        unreachable!();
    };

    // Retention due but held.
    let Ok(held) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };
    assert_eq!(held.action, RetentionAction::None);

    // Hold released, custody still non-terminal.
    let released = fixture
        .service
        .release_hold(&actor(), hold.id(), Utc::now())
        .await;
    assert!(released.is_ok());

    let Ok(non_terminal) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };
    assert_eq!(non_terminal.action, RetentionAction::None);

    // Deletion becomes due only once custody reaches a terminal state.
    record_custody(&fixture, evidence_id, CustodyAction::Returned, 3).await;
    let Ok(terminal) = fixture
        .service
        .evaluate(&actor(), evidence_id, Utc::now())
        .await
    else {
        unreachable!();
    };
    assert_eq!(terminal.action, RetentionAction::Delete);
}

#[tokio::test]
async fn scan_produces_sorted_worklist() {
    let fixture = fixture();
    let policy_id = save_policy(&fixture, RetentionPeriod::Fixed { days: 30 }, true, false).await;
    let older = register_item(&fixture, policy_id, 90).await;
    let newer = register_item(&fixture, policy_id, 60).await;
    let not_due = register_item(&fixture, policy_id, 5).await;

    let Ok(worklist) = fixture.service.scan(&actor(), Utc::now(), 10).await else {
        unreachable!();
    };

    let ids: Vec<_> = worklist.iter().map(|item| item.evidence_id).collect();
    assert_eq!(ids, vec![older, newer]);
    assert!(!ids.contains(&not_due));
}
