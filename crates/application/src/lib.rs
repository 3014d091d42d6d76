//! Application services and ports for the custody and audit engine.

#![forbid(unsafe_code)]

mod archival_ports;
mod archival_service;
mod custody_ports;
mod custody_service;
mod integrity_service;
mod ledger_ports;
mod ledger_service;
mod notify;
mod reporting_service;
mod retention_ports;
mod retention_service;

#[cfg(test)]
mod test_support;

pub use archival_ports::{BlobStore, EvidenceLock, EvidenceLockCoordinator};
pub use archival_service::{ArchivalService, DisposalInput};
pub use custody_ports::{CustodyRepository, EvidenceRepository};
pub use custody_service::{CustodyService, GapEnforcement, GapPolicy, TransitionInput};
pub use integrity_service::{
    CancellationFlag, IntegrityService, VerificationFailure, VerificationReport,
};
pub use ledger_ports::{
    BrokenRange, CheckpointRepository, LedgerAppendRequest, LedgerRepository,
    VerificationCheckpoint,
};
pub use ledger_service::LedgerService;
pub use notify::{ComplianceEvent, ComplianceNotifier};
pub use reporting_service::{ComplianceSummary, ReportingService};
pub use retention_ports::{ArchiveRepository, LegalHoldRepository, RetentionPolicyRepository};
pub use retention_service::{RetentionService, RetentionWorkItem};
