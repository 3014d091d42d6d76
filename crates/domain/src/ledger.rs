use chrono::{DateTime, Utc};
use custodia_core::{AppError, AppResult, PartitionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Hash linked from the first entry of every partition (64 hex zeros).
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Computes the SHA-256 digest of a canonical JSON payload, hex encoded.
///
/// `serde_json` serializes object keys in sorted order, so equal payloads
/// always digest to the same value regardless of construction order.
#[must_use]
pub fn payload_digest(payload: &Value) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex_encode(&hasher.finalize())
}

/// Computes the SHA-256 digest of raw payload bytes, hex encoded.
///
/// Used for blob content verification at archive and restore time.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Computes the chained entry hash.
///
/// `this_hash = SHA-256(prev_hash ‖ sequence_no ‖ recorded_at_micros ‖ payload_digest)`.
/// The timestamp enters as microseconds since the epoch so the value is
/// independent of any textual timestamp formatting.
#[must_use]
pub fn chain_hash(
    prev_hash: &str,
    sequence_no: u64,
    recorded_at: DateTime<Utc>,
    payload_digest: &str,
) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(sequence_no.to_be_bytes());
    hasher.update(recorded_at.timestamp_micros().to_be_bytes());
    hasher.update(payload_digest.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}

/// Stable audit actions appended to the ledger by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when an evidence item is registered with the engine.
    EvidenceRegistered,
    /// Emitted for every accepted custody transition.
    CustodyRecorded,
    /// Emitted when an evidence payload is moved to the archive store.
    EvidenceArchived,
    /// Emitted when an archived payload is restored to the primary store.
    EvidenceRestored,
    /// Emitted before an evidence payload is irreversibly removed.
    EvidenceDisposed,
    /// Emitted when an active legal hold suppressed a due retention action.
    RetentionSuppressed,
    /// Emitted when chain verification finds a mismatch or sequence gap.
    IntegrityFailureRecorded,
    /// Emitted when a legal hold is placed.
    LegalHoldPlaced,
    /// Emitted when a legal hold is released.
    LegalHoldReleased,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvidenceRegistered => "evidence.registered",
            Self::CustodyRecorded => "custody.recorded",
            Self::EvidenceArchived => "evidence.archived",
            Self::EvidenceRestored => "evidence.restored",
            Self::EvidenceDisposed => "evidence.disposed",
            Self::RetentionSuppressed => "retention.suppressed_by_hold",
            Self::IntegrityFailureRecorded => "ledger.integrity_failure",
            Self::LegalHoldPlaced => "legal_hold.placed",
            Self::LegalHoldReleased => "legal_hold.released",
        }
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "evidence.registered" => Ok(Self::EvidenceRegistered),
            "custody.recorded" => Ok(Self::CustodyRecorded),
            "evidence.archived" => Ok(Self::EvidenceArchived),
            "evidence.restored" => Ok(Self::EvidenceRestored),
            "evidence.disposed" => Ok(Self::EvidenceDisposed),
            "retention.suppressed_by_hold" => Ok(Self::RetentionSuppressed),
            "ledger.integrity_failure" => Ok(Self::IntegrityFailureRecorded),
            "legal_hold.placed" => Ok(Self::LegalHoldPlaced),
            "legal_hold.released" => Ok(Self::LegalHoldReleased),
            _ => Err(AppError::Validation(format!(
                "unknown audit action value '{value}'"
            ))),
        }
    }
}

/// Tail of one partition's chain: the last committed sequence and hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTail {
    /// Last committed sequence number.
    pub sequence_no: u64,
    /// Hash of the last committed entry.
    pub entry_hash: String,
}

/// Input payload used to construct a chained audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntryInput {
    /// Target ledger partition.
    pub partition_id: PartitionId,
    /// Subject of the verified actor performing the action.
    pub actor_subject: String,
    /// Stable audit action.
    pub action: AuditAction,
    /// Entity type label, resolved by collaborators at read time.
    pub entity_type: String,
    /// Entity identifier, resolved by collaborators at read time.
    pub entity_id: String,
    /// JSON payload describing the action; only its digest is chained.
    pub payload: Value,
}

/// One immutable, hash-chained audit ledger entry.
///
/// Entries are never edited or deleted once written; corrections are
/// compensating entries referencing the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    partition_id: PartitionId,
    sequence_no: u64,
    recorded_at: DateTime<Utc>,
    actor_subject: String,
    action: AuditAction,
    entity_type: String,
    entity_id: String,
    payload_digest: String,
    prev_hash: String,
    this_hash: String,
}

impl AuditEntry {
    /// Creates the next entry chained onto `tail`, or a genesis entry when
    /// the partition is empty.
    pub fn chained(
        input: AuditEntryInput,
        tail: Option<&ChainTail>,
        recorded_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let AuditEntryInput {
            partition_id,
            actor_subject,
            action,
            entity_type,
            entity_id,
            payload,
        } = input;

        if actor_subject.trim().is_empty() {
            return Err(AppError::Unauthorized(
                "audit entry requires a verified actor subject".to_owned(),
            ));
        }

        if entity_type.trim().is_empty() {
            return Err(AppError::Validation(
                "audit entry entity_type must not be empty".to_owned(),
            ));
        }

        if entity_id.trim().is_empty() {
            return Err(AppError::Validation(
                "audit entry entity_id must not be empty".to_owned(),
            ));
        }

        let (sequence_no, prev_hash) = match tail {
            Some(tail) => (
                tail.sequence_no.checked_add(1).ok_or_else(|| {
                    AppError::Internal("ledger sequence number overflow".to_owned())
                })?,
                tail.entry_hash.clone(),
            ),
            None => (0, GENESIS_HASH.to_owned()),
        };

        let payload_digest = payload_digest(&payload);
        let this_hash = chain_hash(prev_hash.as_str(), sequence_no, recorded_at, &payload_digest);

        Ok(Self {
            partition_id,
            sequence_no,
            recorded_at,
            actor_subject,
            action,
            entity_type,
            entity_id,
            payload_digest,
            prev_hash,
            this_hash,
        })
    }

    /// Reassembles a persisted entry without recomputing its hash.
    ///
    /// Used by storage adapters; verification decides whether the stored
    /// hash still matches the stored fields.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        partition_id: PartitionId,
        sequence_no: u64,
        recorded_at: DateTime<Utc>,
        actor_subject: String,
        action: AuditAction,
        entity_type: String,
        entity_id: String,
        payload_digest: String,
        prev_hash: String,
        this_hash: String,
    ) -> Self {
        Self {
            partition_id,
            sequence_no,
            recorded_at,
            actor_subject,
            action,
            entity_type,
            entity_id,
            payload_digest,
            prev_hash,
            this_hash,
        }
    }

    /// Recomputes the entry hash from the stored fields.
    #[must_use]
    pub fn recompute_hash(&self) -> String {
        chain_hash(
            self.prev_hash.as_str(),
            self.sequence_no,
            self.recorded_at,
            self.payload_digest.as_str(),
        )
    }

    /// Returns true when the stored hash matches the stored fields.
    #[must_use]
    pub fn hash_is_consistent(&self) -> bool {
        self.this_hash == self.recompute_hash()
    }

    /// Returns the chain tail this entry produces.
    #[must_use]
    pub fn tail(&self) -> ChainTail {
        ChainTail {
            sequence_no: self.sequence_no,
            entry_hash: self.this_hash.clone(),
        }
    }

    /// Returns the ledger partition.
    #[must_use]
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Returns the per-partition sequence number.
    #[must_use]
    pub fn sequence_no(&self) -> u64 {
        self.sequence_no
    }

    /// Returns the commit timestamp.
    #[must_use]
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Returns the acting subject.
    #[must_use]
    pub fn actor_subject(&self) -> &str {
        self.actor_subject.as_str()
    }

    /// Returns the audit action.
    #[must_use]
    pub fn action(&self) -> AuditAction {
        self.action
    }

    /// Returns the entity type label.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.entity_type.as_str()
    }

    /// Returns the entity identifier.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        self.entity_id.as_str()
    }

    /// Returns the payload digest.
    #[must_use]
    pub fn payload_digest(&self) -> &str {
        self.payload_digest.as_str()
    }

    /// Returns the previous entry hash.
    #[must_use]
    pub fn prev_hash(&self) -> &str {
        self.prev_hash.as_str()
    }

    /// Returns the entry hash.
    #[must_use]
    pub fn this_hash(&self) -> &str {
        self.this_hash.as_str()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use custodia_core::PartitionId;
    use serde_json::json;

    use super::{AuditAction, AuditEntry, AuditEntryInput, GENESIS_HASH, payload_digest};

    fn input(partition_id: PartitionId) -> AuditEntryInput {
        AuditEntryInput {
            partition_id,
            actor_subject: "officer.doe".to_owned(),
            action: AuditAction::CustodyRecorded,
            entity_type: "evidence".to_owned(),
            entity_id: "e-1".to_owned(),
            payload: json!({"action": "seized"}),
        }
    }

    #[test]
    fn genesis_entry_links_to_zero_hash() {
        let recorded_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single();
        let Some(recorded_at) = recorded_at else {
            unreachable!();
        };
        let entry = AuditEntry::chained(input(PartitionId::new()), None, recorded_at);
        let Ok(entry) = entry else {
            unreachable!();
        };

        assert_eq!(entry.sequence_no(), 0);
        assert_eq!(entry.prev_hash(), GENESIS_HASH);
        assert!(entry.hash_is_consistent());
    }

    #[test]
    fn chained_entry_links_to_previous_hash() {
        let recorded_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single();
        let Some(recorded_at) = recorded_at else {
            unreachable!();
        };
        let partition_id = PartitionId::new();
        let Ok(first) = AuditEntry::chained(input(partition_id), None, recorded_at) else {
            unreachable!();
        };
        let Ok(second) = AuditEntry::chained(input(partition_id), Some(&first.tail()), recorded_at)
        else {
            unreachable!();
        };

        assert_eq!(second.sequence_no(), 1);
        assert_eq!(second.prev_hash(), first.this_hash());
        assert!(second.hash_is_consistent());
    }

    #[test]
    fn blank_actor_subject_is_rejected() {
        let recorded_at = Utc::now();
        let mut blank = input(PartitionId::new());
        blank.actor_subject = " ".to_owned();
        assert!(AuditEntry::chained(blank, None, recorded_at).is_err());
    }

    #[test]
    fn payload_digest_is_order_independent() {
        let left = payload_digest(&json!({"a": 1, "b": 2}));
        let right = payload_digest(&json!({"b": 2, "a": 1}));
        assert_eq!(left, right);
    }

    #[test]
    fn tampered_digest_breaks_hash_consistency() {
        let recorded_at = Utc::now();
        let Ok(entry) = AuditEntry::chained(input(PartitionId::new()), None, recorded_at) else {
            unreachable!();
        };
        let tampered = AuditEntry::from_stored(
            entry.partition_id(),
            entry.sequence_no(),
            entry.recorded_at(),
            entry.actor_subject().to_owned(),
            entry.action(),
            entry.entity_type().to_owned(),
            entry.entity_id().to_owned(),
            payload_digest(&json!({"action": "altered"})),
            entry.prev_hash().to_owned(),
            entry.this_hash().to_owned(),
        );

        assert!(!tampered.hash_is_consistent());
    }
}
