use std::str::FromStr;

use chrono::{DateTime, Utc};
use custodia_core::{AppError, AppResult, EvidenceId, NonEmptyString, PartitionId};
use serde::{Deserialize, Serialize};

use crate::retention::RetentionPolicyId;

/// Lifecycle disposition of an evidence payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Payload lives in the primary store.
    Active,
    /// Payload lives in the archive store.
    Archived,
    /// Payload has been irreversibly removed.
    Disposed,
}

impl Disposition {
    /// Returns a stable storage value for this disposition.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Disposed => "disposed",
        }
    }
}

impl FromStr for Disposition {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            "disposed" => Ok(Self::Disposed),
            _ => Err(AppError::Validation(format!(
                "unknown disposition value '{value}'"
            ))),
        }
    }
}

/// Input payload used to register a validated evidence item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceItemInput {
    /// Stable identifier supplied by the evidence registry.
    pub id: EvidenceId,
    /// Ledger partition (case file) the item belongs to.
    pub partition_id: PartitionId,
    /// Evidence category, selects custody transition rules.
    pub category: String,
    /// Primary blob store reference for the payload.
    pub storage_ref: String,
    /// Retention policy governing the item.
    pub retention_policy_id: RetentionPolicyId,
    /// Registration timestamp supplied by the evidence registry.
    pub registered_at: DateTime<Utc>,
}

/// Evidence item tracked by the custody and retention engine.
///
/// The engine holds no case-domain fields beyond the stable id, partition
/// and registration timestamp supplied by the registry collaborator.
/// Legal-hold status is derived from the hold table, never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    id: EvidenceId,
    partition_id: PartitionId,
    category: NonEmptyString,
    storage_ref: NonEmptyString,
    retention_policy_id: RetentionPolicyId,
    registered_at: DateTime<Utc>,
    disposition: Disposition,
}

impl EvidenceItem {
    /// Creates a validated evidence item in the `Active` disposition.
    pub fn new(input: EvidenceItemInput) -> AppResult<Self> {
        let EvidenceItemInput {
            id,
            partition_id,
            category,
            storage_ref,
            retention_policy_id,
            registered_at,
        } = input;

        Ok(Self {
            id,
            partition_id,
            category: NonEmptyString::new(category)?,
            storage_ref: NonEmptyString::new(storage_ref)?,
            retention_policy_id,
            registered_at,
            disposition: Disposition::Active,
        })
    }

    /// Returns the evidence identifier.
    #[must_use]
    pub fn id(&self) -> EvidenceId {
        self.id
    }

    /// Returns the ledger partition the item belongs to.
    #[must_use]
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Returns the evidence category.
    #[must_use]
    pub fn category(&self) -> &str {
        self.category.as_str()
    }

    /// Returns the primary blob store reference.
    #[must_use]
    pub fn storage_ref(&self) -> &str {
        self.storage_ref.as_str()
    }

    /// Returns the governing retention policy identifier.
    #[must_use]
    pub fn retention_policy_id(&self) -> RetentionPolicyId {
        self.retention_policy_id
    }

    /// Returns the registration timestamp.
    #[must_use]
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Returns the current disposition.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Replaces the disposition, returning the updated item.
    #[must_use]
    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Replaces the primary storage reference, returning the updated item.
    ///
    /// Used when a restored payload lands under a fresh primary ref.
    pub fn with_storage_ref(mut self, storage_ref: impl Into<String>) -> AppResult<Self> {
        self.storage_ref = NonEmptyString::new(storage_ref)?;
        Ok(self)
    }
}
