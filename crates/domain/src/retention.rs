use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use custodia_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention policy identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetentionPolicyId(Uuid);

impl RetentionPolicyId {
    /// Creates a random policy identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a policy identifier from an existing UUID value.
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

impl Default for RetentionPolicyId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RetentionPolicyId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// How long evidence is held before it becomes eligible for lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetentionPeriod {
    /// Fixed duration in whole days after the anchor event.
    Fixed {
        /// Retention length in days.
        days: u32,
    },
    /// Never expires.
    Permanent,
    /// Sentinel for items governed solely by legal-hold status; never expires.
    LegalHold,
}

impl RetentionPeriod {
    /// Returns the retention duration, or `None` for non-expiring sentinels.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Fixed { days } => Some(Duration::days(i64::from(*days))),
            Self::Permanent | Self::LegalHold => None,
        }
    }
}

/// Event a retention period is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionAnchor {
    /// The registry-supplied registration timestamp.
    EvidenceRegistered,
    /// The most recent custody entry's occurrence time.
    LastCustodyAction,
}

impl RetentionAnchor {
    /// Returns a stable storage value for this anchor.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvidenceRegistered => "evidence_registered",
            Self::LastCustodyAction => "last_custody_action",
        }
    }
}

/// Lifecycle action produced by retention evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionAction {
    /// Nothing is due.
    None,
    /// The payload is due for archival.
    Archive,
    /// The payload is due for irreversible deletion.
    Delete,
}

impl RetentionAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Archive => "archive",
            Self::Delete => "delete",
        }
    }
}

/// Result of evaluating one evidence item against its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionDecision {
    /// Due lifecycle action, `None` when nothing applies.
    pub action: RetentionAction,
    /// When the action became or becomes due; absent for non-expiring periods.
    pub due_at: Option<DateTime<Utc>>,
}

impl RetentionDecision {
    /// A decision with no due action and no deadline.
    #[must_use]
    pub fn none() -> Self {
        Self {
            action: RetentionAction::None,
            due_at: None,
        }
    }
}

/// Input payload used to construct a validated retention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicyInput {
    /// Policy identifier.
    pub id: RetentionPolicyId,
    /// Entity type the policy applies to.
    pub entity_type: String,
    /// Retention period.
    pub period: RetentionPeriod,
    /// Event the period is measured from.
    pub anchor: RetentionAnchor,
    /// Whether due items are archived automatically.
    pub auto_archive: bool,
    /// Whether due, terminal items are deleted automatically.
    pub auto_delete: bool,
}

/// Rule set defining how long evidence is held before archival/deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    id: RetentionPolicyId,
    entity_type: NonEmptyString,
    period: RetentionPeriod,
    anchor: RetentionAnchor,
    auto_archive: bool,
    auto_delete: bool,
}

impl RetentionPolicy {
    /// Creates a validated retention policy.
    pub fn new(input: RetentionPolicyInput) -> AppResult<Self> {
        let RetentionPolicyInput {
            id,
            entity_type,
            period,
            anchor,
            auto_archive,
            auto_delete,
        } = input;

        if let RetentionPeriod::Fixed { days: 0 } = period {
            return Err(AppError::Validation(
                "fixed retention period must be at least one day".to_owned(),
            ));
        }

        Ok(Self {
            id,
            entity_type: NonEmptyString::new(entity_type)?,
            period,
            anchor,
            auto_archive,
            auto_delete,
        })
    }

    /// Returns the policy identifier.
    #[must_use]
    pub fn id(&self) -> RetentionPolicyId {
        self.id
    }

    /// Returns the entity type label.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.entity_type.as_str()
    }

    /// Returns the retention period.
    #[must_use]
    pub fn period(&self) -> RetentionPeriod {
        self.period
    }

    /// Returns the anchor event.
    #[must_use]
    pub fn anchor(&self) -> RetentionAnchor {
        self.anchor
    }

    /// Returns whether due items are archived automatically.
    #[must_use]
    pub fn auto_archive(&self) -> bool {
        self.auto_archive
    }

    /// Returns whether due, terminal items are deleted automatically.
    #[must_use]
    pub fn auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// Computes when the policy expires relative to the anchor event time.
    ///
    /// Returns `None` for `Permanent` and `LegalHold` periods, which never
    /// expire.
    #[must_use]
    pub fn due_at(&self, anchor_time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.period.duration().map(|duration| anchor_time + duration)
    }
}
