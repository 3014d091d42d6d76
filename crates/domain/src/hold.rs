use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use custodia_core::{AppError, AppResult, EvidenceId, NonEmptyString, PartitionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Legal hold identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegalHoldId(Uuid);

impl LegalHoldId {
    /// Creates a random hold identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a hold identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LegalHoldId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LegalHoldId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// What a legal hold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HoldScope {
    /// One evidence item.
    Evidence {
        /// Held evidence identifier.
        evidence_id: EvidenceId,
    },
    /// Every evidence item in a case partition.
    Case {
        /// Held case partition.
        partition_id: PartitionId,
    },
}

/// Administrative flag suspending retention and disposal processing.
///
/// A hold is active while `released_at` is `None`; release never deletes the
/// hold record, so past holds stay auditable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalHold {
    id: LegalHoldId,
    scope: HoldScope,
    reason: NonEmptyString,
    created_by: String,
    created_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
}

impl LegalHold {
    /// Creates an active legal hold.
    pub fn new(
        id: LegalHoldId,
        scope: HoldScope,
        reason: impl Into<String>,
        created_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            scope,
            reason: NonEmptyString::new(reason)?,
            created_by: created_by.into(),
            created_at,
            released_at: None,
        })
    }

    /// Reassembles a persisted hold.
    #[must_use]
    pub fn from_stored(
        id: LegalHoldId,
        scope: HoldScope,
        reason: NonEmptyString,
        created_by: String,
        created_at: DateTime<Utc>,
        released_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            scope,
            reason,
            created_by,
            created_at,
            released_at,
        }
    }

    /// Returns the hold identifier.
    #[must_use]
    pub fn id(&self) -> LegalHoldId {
        self.id
    }

    /// Returns the hold scope.
    #[must_use]
    pub fn scope(&self) -> HoldScope {
        self.scope
    }

    /// Returns the hold reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason.as_str()
    }

    /// Returns the subject that placed the hold.
    #[must_use]
    pub fn created_by(&self) -> &str {
        self.created_by.as_str()
    }

    /// Returns when the hold was placed.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the hold was released, if it has been.
    #[must_use]
    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.released_at
    }

    /// Returns true while the hold suspends retention and disposal.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }

    /// Returns true when the hold covers the given item.
    #[must_use]
    pub fn applies_to(&self, evidence_id: EvidenceId, partition_id: PartitionId) -> bool {
        match self.scope {
            HoldScope::Evidence { evidence_id: held } => held == evidence_id,
            HoldScope::Case { partition_id: held } => held == partition_id,
        }
    }

    /// Releases the hold.
    pub fn release(&mut self, released_at: DateTime<Utc>) -> AppResult<()> {
        if self.released_at.is_some() {
            return Err(AppError::Conflict(format!(
                "legal hold '{}' is already released",
                self.id
            )));
        }

        self.released_at = Some(released_at);
        Ok(())
    }
}
