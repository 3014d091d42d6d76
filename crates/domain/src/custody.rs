use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use custodia_core::{AppError, AppResult, EvidenceId};
use serde::{Deserialize, Serialize};

/// Custody action recorded for one evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyAction {
    /// Initial seizure; must be the first entry for the item.
    Seized,
    /// Handoff to another custodian or location.
    Transferred,
    /// Forensic analysis performed.
    Analyzed,
    /// Presented as an exhibit in court.
    PresentedCourt,
    /// Returned to its owner; terminal.
    Returned,
    /// Physically disposed; terminal.
    Disposed,
}

impl CustodyAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seized => "seized",
            Self::Transferred => "transferred",
            Self::Analyzed => "analyzed",
            Self::PresentedCourt => "presented_court",
            Self::Returned => "returned",
            Self::Disposed => "disposed",
        }
    }

    /// Returns the custody state the item is in after this action.
    #[must_use]
    pub fn resulting_state(&self) -> CustodyState {
        match self {
            Self::Seized => CustodyState::Seized,
            Self::Transferred => CustodyState::InCustody,
            Self::Analyzed => CustodyState::Analyzed,
            Self::PresentedCourt => CustodyState::PresentedCourt,
            Self::Returned => CustodyState::Returned,
            Self::Disposed => CustodyState::Disposed,
        }
    }
}

impl FromStr for CustodyAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "seized" => Ok(Self::Seized),
            "transferred" => Ok(Self::Transferred),
            "analyzed" => Ok(Self::Analyzed),
            "presented_court" => Ok(Self::PresentedCourt),
            "returned" => Ok(Self::Returned),
            "disposed" => Ok(Self::Disposed),
            _ => Err(AppError::Validation(format!(
                "unknown custody action value '{value}'"
            ))),
        }
    }
}

/// Custody state derived from the latest recorded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyState {
    /// Seized and held by the seizing custodian; initial state.
    Seized,
    /// Held by a custodian after a transfer.
    InCustody,
    /// Under or after forensic analysis.
    Analyzed,
    /// Presented in court.
    PresentedCourt,
    /// Returned to its owner; terminal.
    Returned,
    /// Physically disposed; terminal.
    Disposed,
}

impl CustodyState {
    /// Returns a stable storage value for this state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seized => "seized",
            Self::InCustody => "in_custody",
            Self::Analyzed => "analyzed",
            Self::PresentedCourt => "presented_court",
            Self::Returned => "returned",
            Self::Disposed => "disposed",
        }
    }

    /// Returns true when no further custody actions are permitted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Returned | Self::Disposed)
    }
}

impl FromStr for CustodyState {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "seized" => Ok(Self::Seized),
            "in_custody" => Ok(Self::InCustody),
            "analyzed" => Ok(Self::Analyzed),
            "presented_court" => Ok(Self::PresentedCourt),
            "returned" => Ok(Self::Returned),
            "disposed" => Ok(Self::Disposed),
            _ => Err(AppError::Validation(format!(
                "unknown custody state value '{value}'"
            ))),
        }
    }
}

const NON_TERMINAL_STATES: &[CustodyState] = &[
    CustodyState::Seized,
    CustodyState::InCustody,
    CustodyState::Analyzed,
    CustodyState::PresentedCourt,
];

/// Transition table mapping each action to its valid prior states.
///
/// `Seized` is valid only as the first entry and therefore has no prior
/// states; every other action lists the states it may follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRules {
    allowed: HashMap<CustodyAction, Vec<CustodyState>>,
}

impl TransitionRules {
    /// Creates a rule set from an explicit action-to-prior-states table.
    #[must_use]
    pub fn new(allowed: HashMap<CustodyAction, Vec<CustodyState>>) -> Self {
        Self { allowed }
    }

    /// Returns true when `action` is permitted from `prior` state.
    ///
    /// `prior = None` means the item has no custody entries yet; only
    /// `Seized` is permitted there.
    #[must_use]
    pub fn allows(&self, action: CustodyAction, prior: Option<CustodyState>) -> bool {
        match (action, prior) {
            (CustodyAction::Seized, None) => true,
            (CustodyAction::Seized, Some(_)) | (_, None) => false,
            (action, Some(state)) => self
                .allowed
                .get(&action)
                .is_some_and(|states| states.contains(&state)),
        }
    }
}

impl Default for TransitionRules {
    fn default() -> Self {
        let mut allowed = HashMap::new();
        allowed.insert(
            CustodyAction::Transferred,
            vec![
                CustodyState::Seized,
                CustodyState::InCustody,
                CustodyState::Analyzed,
                CustodyState::PresentedCourt,
            ],
        );
        allowed.insert(
            CustodyAction::Analyzed,
            vec![CustodyState::Seized, CustodyState::InCustody],
        );
        allowed.insert(
            CustodyAction::PresentedCourt,
            vec![
                CustodyState::Seized,
                CustodyState::InCustody,
                CustodyState::Analyzed,
            ],
        );
        allowed.insert(CustodyAction::Returned, NON_TERMINAL_STATES.to_vec());
        allowed.insert(CustodyAction::Disposed, NON_TERMINAL_STATES.to_vec());

        Self { allowed }
    }
}

/// Registry resolving transition rules per evidence category.
///
/// New evidence categories register their own rule set without touching the
/// state machine; unregistered categories fall back to the default table.
#[derive(Debug, Clone, Default)]
pub struct CustodyRuleRegistry {
    default_rules: TransitionRules,
    by_category: HashMap<String, TransitionRules>,
}

impl CustodyRuleRegistry {
    /// Creates a registry with the default rule set and no category overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a category-specific rule set, replacing any previous one.
    pub fn register(&mut self, category: impl Into<String>, rules: TransitionRules) {
        self.by_category.insert(category.into(), rules);
    }

    /// Returns the rule set for a category, falling back to the default.
    #[must_use]
    pub fn rules_for(&self, category: &str) -> &TransitionRules {
        self.by_category.get(category).unwrap_or(&self.default_rules)
    }
}

/// Input payload used to construct a validated custody entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodyEntryInput {
    /// Custody action being recorded.
    pub action: CustodyAction,
    /// Custodian handing the item over; absent on the first entry.
    pub from_custodian: Option<String>,
    /// Custodian receiving the item; required for non-terminal actions.
    pub to_custodian: Option<String>,
    /// Location the item leaves; absent on the first entry.
    pub from_location: Option<String>,
    /// Location the item arrives at.
    pub to_location: Option<String>,
    /// When the action physically occurred.
    pub occurred_at: DateTime<Utc>,
    /// Optional free-form note, e.g. explaining a delayed handoff.
    pub note: Option<String>,
}

/// One immutable per-evidence custody entry.
///
/// Custodians and locations are opaque identifiers resolved by collaborator
/// services at read time; entries are never edited or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyEntry {
    evidence_id: EvidenceId,
    sequence_no: u64,
    action: CustodyAction,
    from_custodian: Option<String>,
    to_custodian: Option<String>,
    from_location: Option<String>,
    to_location: Option<String>,
    occurred_at: DateTime<Utc>,
    recorded_by: String,
    note: Option<String>,
}

impl CustodyEntry {
    /// Creates a validated custody entry at the given per-evidence sequence.
    pub fn new(
        evidence_id: EvidenceId,
        sequence_no: u64,
        recorded_by: impl Into<String>,
        input: CustodyEntryInput,
    ) -> AppResult<Self> {
        let CustodyEntryInput {
            action,
            from_custodian,
            to_custodian,
            from_location,
            to_location,
            occurred_at,
            note,
        } = input;

        let recorded_by = recorded_by.into();
        if recorded_by.trim().is_empty() {
            return Err(AppError::Unauthorized(
                "custody entry requires a verified recorder".to_owned(),
            ));
        }

        if !action.resulting_state().is_terminal()
            && to_custodian.as_deref().is_none_or(|value| value.trim().is_empty())
        {
            return Err(AppError::InvalidTransition(format!(
                "custody action '{}' requires a receiving custodian",
                action.as_str()
            )));
        }

        let note = note.and_then(|value| {
            let trimmed = value.trim().to_owned();
            (!trimmed.is_empty()).then_some(trimmed)
        });

        Ok(Self {
            evidence_id,
            sequence_no,
            action,
            from_custodian,
            to_custodian,
            from_location,
            to_location,
            occurred_at,
            recorded_by,
            note,
        })
    }

    /// Reassembles a persisted custody entry.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        evidence_id: EvidenceId,
        sequence_no: u64,
        action: CustodyAction,
        from_custodian: Option<String>,
        to_custodian: Option<String>,
        from_location: Option<String>,
        to_location: Option<String>,
        occurred_at: DateTime<Utc>,
        recorded_by: String,
        note: Option<String>,
    ) -> Self {
        Self {
            evidence_id,
            sequence_no,
            action,
            from_custodian,
            to_custodian,
            from_location,
            to_location,
            occurred_at,
            recorded_by,
            note,
        }
    }

    /// Returns the evidence identifier.
    #[must_use]
    pub fn evidence_id(&self) -> EvidenceId {
        self.evidence_id
    }

    /// Returns the per-evidence sequence number.
    #[must_use]
    pub fn sequence_no(&self) -> u64 {
        self.sequence_no
    }

    /// Returns the recorded custody action.
    #[must_use]
    pub fn action(&self) -> CustodyAction {
        self.action
    }

    /// Returns the custodian the item came from, if any.
    #[must_use]
    pub fn from_custodian(&self) -> Option<&str> {
        self.from_custodian.as_deref()
    }

    /// Returns the custodian the item went to, if any.
    #[must_use]
    pub fn to_custodian(&self) -> Option<&str> {
        self.to_custodian.as_deref()
    }

    /// Returns the location the item left, if any.
    #[must_use]
    pub fn from_location(&self) -> Option<&str> {
        self.from_location.as_deref()
    }

    /// Returns the location the item arrived at, if any.
    #[must_use]
    pub fn to_location(&self) -> Option<&str> {
        self.to_location.as_deref()
    }

    /// Returns when the action physically occurred.
    #[must_use]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Returns the subject who recorded the entry.
    #[must_use]
    pub fn recorded_by(&self) -> &str {
        self.recorded_by.as_str()
    }

    /// Returns the optional note.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}
