use chrono::Duration;
use custodia_core::EvidenceId;
use serde::{Deserialize, Serialize};

use crate::custody::CustodyEntry;

/// Kind of custody continuity finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFindingKind {
    /// Custodian or location mismatch between consecutive entries.
    ContinuityBreak,
    /// Non-monotonic timestamps, or an unexplained gap over the threshold.
    TemporalAnomaly,
    /// Absent `from_custodian` on a non-first entry.
    MissingCustodian,
}

impl GapFindingKind {
    /// Returns a stable storage value for this finding kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContinuityBreak => "continuity_break",
            Self::TemporalAnomaly => "temporal_anomaly",
            Self::MissingCustodian => "missing_custodian",
        }
    }
}

/// One finding produced by custody sequence analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapFinding {
    /// Evidence item the finding belongs to.
    pub evidence_id: EvidenceId,
    /// Sequence number of the entry the finding is flagged at.
    pub sequence_no: u64,
    /// Finding kind.
    pub kind: GapFindingKind,
    /// Human-readable description of the discontinuity.
    pub detail: String,
}

/// Analyzes an ordered custody sequence for continuity and temporal anomalies.
///
/// Findings are flagged at the later entry of each offending pair. A fully
/// continuous, monotonic sequence yields no findings. Gaps longer than
/// `max_silent_gap` are only flagged when the later entry carries no note;
/// legitimate delayed handoffs are expected to be annotated.
#[must_use]
pub fn analyze_sequence(entries: &[CustodyEntry], max_silent_gap: Duration) -> Vec<GapFinding> {
    let mut findings = Vec::new();

    for pair in entries.windows(2) {
        let [previous, current] = pair else {
            continue;
        };

        if current.from_custodian().is_none() {
            findings.push(GapFinding {
                evidence_id: current.evidence_id(),
                sequence_no: current.sequence_no(),
                kind: GapFindingKind::MissingCustodian,
                detail: format!(
                    "entry {} records no releasing custodian",
                    current.sequence_no()
                ),
            });
        } else if previous.to_custodian() != current.from_custodian() {
            findings.push(GapFinding {
                evidence_id: current.evidence_id(),
                sequence_no: current.sequence_no(),
                kind: GapFindingKind::ContinuityBreak,
                detail: format!(
                    "custodian discontinuity: entry {} released to '{}' but entry {} was received from '{}'",
                    previous.sequence_no(),
                    previous.to_custodian().unwrap_or("<none>"),
                    current.sequence_no(),
                    current.from_custodian().unwrap_or("<none>"),
                ),
            });
        }

        if current.from_location().is_some() && previous.to_location() != current.from_location() {
            findings.push(GapFinding {
                evidence_id: current.evidence_id(),
                sequence_no: current.sequence_no(),
                kind: GapFindingKind::ContinuityBreak,
                detail: format!(
                    "location discontinuity: entry {} left the item at '{}' but entry {} picked it up at '{}'",
                    previous.sequence_no(),
                    previous.to_location().unwrap_or("<none>"),
                    current.sequence_no(),
                    current.from_location().unwrap_or("<none>"),
                ),
            });
        }

        if current.occurred_at() < previous.occurred_at() {
            findings.push(GapFinding {
                evidence_id: current.evidence_id(),
                sequence_no: current.sequence_no(),
                kind: GapFindingKind::TemporalAnomaly,
                detail: format!(
                    "entry {} occurred before entry {}",
                    current.sequence_no(),
                    previous.sequence_no()
                ),
            });
        } else {
            let elapsed = current.occurred_at() - previous.occurred_at();
            if elapsed > max_silent_gap && current.note().is_none() {
                findings.push(GapFinding {
                    evidence_id: current.evidence_id(),
                    sequence_no: current.sequence_no(),
                    kind: GapFindingKind::TemporalAnomaly,
                    detail: format!(
                        "unexplained {} minute gap before entry {}",
                        elapsed.num_minutes(),
                        current.sequence_no()
                    ),
                });
            }
        }
    }

    findings
}
