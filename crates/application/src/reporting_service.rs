use std::sync::Arc;

use chrono::{DateTime, Utc};
use custodia_core::AppResult;
use custodia_domain::{Disposition, RetentionAction};
use serde::{Deserialize, Serialize};

use crate::custody_ports::EvidenceRepository;
use crate::ledger_ports::{BrokenRange, CheckpointRepository, LedgerRepository};
use crate::retention_ports::LegalHoldRepository;
use crate::retention_service::RetentionService;


/// Upper bound on items inspected per report.
const REPORT_SCAN_LIMIT: usize = 10_000;

/// Read-only compliance summary for the reporting collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    /// Total committed ledger entries across all partitions.
    pub total_entries: u64,
    /// Ranges that failed verification and are marked unverified.
    pub broken_ranges: Vec<BrokenRange>,
    /// Items whose lifecycle action is past due, before hold suppression.
    pub items_overdue_for_disposal: u64,
    /// Items covered by at least one active legal hold.
    pub items_under_hold: u64,
}

/// Read-only query surface over the engine's repositories.
#[derive(Clone)]
pub struct ReportingService {
    ledger: Arc<dyn LedgerRepository>,
    checkpoints: Arc<dyn CheckpointRepository>,
    evidence: Arc<dyn EvidenceRepository>,
    holds: Arc<dyn LegalHoldRepository>,
    retention: RetentionService,
}

impl ReportingService {
    /// Creates a reporting service.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        checkpoints: Arc<dyn CheckpointRepository>,
        evidence: Arc<dyn EvidenceRepository>,
        holds: Arc<dyn LegalHoldRepository>,
        retention: RetentionService,
    ) -> Self {
        Self {
            ledger,
            checkpoints,
            evidence,
            holds,
            retention,
        }
    }

    /// Builds the compliance summary as of the given instant.
    ///
    /// Reads only; never appends, never mutates item state.
    pub async fn compliance_report(&self, as_of: DateTime<Utc>) -> AppResult<ComplianceSummary> {
        let total_entries = self.ledger.count_entries().await?;
        let broken_ranges = self.checkpoints.list_broken_ranges().await?;
        let active_holds = self.holds.active_holds().await?;

        let mut items_overdue_for_disposal = 0;
        let mut items_under_hold = 0;

        for disposition in [Disposition::Active, Disposition::Archived] {
            let items = self
                .evidence
                .list_by_disposition(disposition, REPORT_SCAN_LIMIT)
                .await?;
            for item in items {
                let assessment = self.retention.assess(&item, as_of).await?;
                if assessment.computed_action != RetentionAction::None {
                    items_overdue_for_disposal += 1;
                }

                if active_holds
                    .iter()
                    .any(|hold| hold.applies_to(item.id(), item.partition_id()))
                {
                    items_under_hold += 1;
                }
            }
        }

        Ok(ComplianceSummary {
            total_entries,
            broken_ranges,
            items_overdue_for_disposal,
            items_under_hold,
        })
    }
}
