//! Domain entities and invariants for the custody and audit engine.

#![forbid(unsafe_code)]

mod archive;
mod custody;
mod evidence;
mod gap;
mod hold;
mod ledger;
mod retention;

pub use archive::ArchiveRecord;
pub use custody::{
    CustodyAction, CustodyEntry, CustodyEntryInput, CustodyRuleRegistry, CustodyState,
    TransitionRules,
};
pub use evidence::{Disposition, EvidenceItem, EvidenceItemInput};
pub use gap::{GapFinding, GapFindingKind, analyze_sequence};
pub use hold::{HoldScope, LegalHold, LegalHoldId};
pub use ledger::{
    AuditAction, AuditEntry, AuditEntryInput, ChainTail, GENESIS_HASH, chain_hash, content_digest,
    payload_digest,
};
pub use retention::{
    RetentionAction, RetentionAnchor, RetentionDecision, RetentionPeriod, RetentionPolicy,
    RetentionPolicyId, RetentionPolicyInput,
};
