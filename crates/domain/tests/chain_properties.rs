//! Property-based tests for the hash chain and custody continuity analysis.

use chrono::{Duration, TimeZone, Utc};
use custodia_core::{EvidenceId, PartitionId};
use proptest::prelude::*;
use serde_json::json;

use custodia_domain::{
    AuditAction, AuditEntry, AuditEntryInput, CustodyAction, CustodyEntry, GENESIS_HASH,
    analyze_sequence, payload_digest,
};

fn build_chain(partition_id: PartitionId, payloads: &[u64]) -> Vec<AuditEntry> {
    let base = Utc
        .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let mut entries: Vec<AuditEntry> = Vec::with_capacity(payloads.len());

    for (index, payload) in payloads.iter().enumerate() {
        let tail = entries.last().map(AuditEntry::tail);
        let entry = AuditEntry::chained(
            AuditEntryInput {
                partition_id,
                actor_subject: "officer.doe".to_owned(),
                action: AuditAction::CustodyRecorded,
                entity_type: "evidence".to_owned(),
                entity_id: "e-1".to_owned(),
                payload: json!({ "value": payload }),
            },
            tail.as_ref(),
            base + Duration::seconds(index as i64),
        );
        match entry {
            Ok(entry) => entries.push(entry),
            Err(_) => unreachable!(),
        }
    }

    entries
}

/// Replays the chain the way the integrity verifier does.
fn first_broken_sequence(entries: &[AuditEntry]) -> Option<u64> {
    let mut prev_hash = GENESIS_HASH.to_owned();
    for entry in entries {
        if entry.prev_hash() != prev_hash || !entry.hash_is_consistent() {
            return Some(entry.sequence_no());
        }
        prev_hash = entry.this_hash().to_owned();
    }
    None
}

fn tamper_digest(entries: &mut [AuditEntry], index: usize) {
    let entry = &entries[index];
    let tampered = AuditEntry::from_stored(
        entry.partition_id(),
        entry.sequence_no(),
        entry.recorded_at(),
        entry.actor_subject().to_owned(),
        entry.action(),
        entry.entity_type().to_owned(),
        entry.entity_id().to_owned(),
        payload_digest(&json!({ "tampered": true })),
        entry.prev_hash().to_owned(),
        entry.this_hash().to_owned(),
    );
    entries[index] = tampered;
}

proptest! {
    #[test]
    fn valid_chains_verify_end_to_end(payloads in proptest::collection::vec(any::<u64>(), 1..64)) {
        let entries = build_chain(PartitionId::new(), &payloads);
        prop_assert_eq!(first_broken_sequence(&entries), None);
        prop_assert_eq!(entries[0].prev_hash(), GENESIS_HASH);
    }

    #[test]
    fn tampering_any_entry_is_detected_at_that_sequence(
        payloads in proptest::collection::vec(any::<u64>(), 2..48),
        index_seed in any::<prop::sample::Index>(),
    ) {
        let mut entries = build_chain(PartitionId::new(), &payloads);
        let index = index_seed.index(entries.len());
        tamper_digest(&mut entries, index);

        prop_assert_eq!(first_broken_sequence(&entries), Some(index as u64));
    }

    #[test]
    fn sequence_numbers_are_contiguous_from_zero(
        payloads in proptest::collection::vec(any::<u64>(), 1..64),
    ) {
        let entries = build_chain(PartitionId::new(), &payloads);
        for (index, entry) in entries.iter().enumerate() {
            prop_assert_eq!(entry.sequence_no(), index as u64);
        }
    }

    #[test]
    fn continuous_custody_chains_are_never_flagged(length in 1usize..24) {
        let evidence_id = EvidenceId::new();
        let base = Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let entries: Vec<CustodyEntry> = (0..length)
            .map(|index| {
                CustodyEntry::from_stored(
                    evidence_id,
                    index as u64,
                    if index == 0 { CustodyAction::Seized } else { CustodyAction::Transferred },
                    (index > 0).then(|| format!("custodian-{}", index - 1)),
                    Some(format!("custodian-{index}")),
                    (index > 0).then(|| "vault-1".to_owned()),
                    Some("vault-1".to_owned()),
                    base + Duration::minutes(index as i64),
                    "officer.doe".to_owned(),
                    None,
                )
            })
            .collect();

        prop_assert!(analyze_sequence(&entries, Duration::hours(1)).is_empty());
    }

    #[test]
    fn custodian_breaks_are_always_flagged(break_at in 1usize..12, length in 2usize..16) {
        prop_assume!(break_at < length);
        let evidence_id = EvidenceId::new();
        let base = Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let entries: Vec<CustodyEntry> = (0..length)
            .map(|index| {
                let from = if index == 0 {
                    None
                } else if index == break_at {
                    Some("unrelated-party".to_owned())
                } else {
                    Some(format!("custodian-{}", index - 1))
                };
                CustodyEntry::from_stored(
                    evidence_id,
                    index as u64,
                    if index == 0 { CustodyAction::Seized } else { CustodyAction::Transferred },
                    from,
                    Some(format!("custodian-{index}")),
                    (index > 0).then(|| "vault-1".to_owned()),
                    Some("vault-1".to_owned()),
                    base + Duration::minutes(index as i64),
                    "officer.doe".to_owned(),
                    None,
                )
            })
            .collect();

        let findings = analyze_sequence(&entries, Duration::hours(1));
        prop_assert!(
            findings
                .iter()
                .any(|finding| finding.sequence_no == break_at as u64)
        );
    }
}
