//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_blob_store;
mod in_memory_checkpoint_repository;
mod in_memory_custody_repository;
mod in_memory_evidence_lock_coordinator;
mod in_memory_evidence_repository;
mod in_memory_ledger_repository;
mod in_memory_retention_repository;
mod postgres_checkpoint_repository;
mod postgres_compliance_repository;
mod postgres_custody_repository;
mod postgres_ledger_repository;
mod redis_evidence_lock_coordinator;
mod tracing_compliance_notifier;

pub use in_memory_blob_store::InMemoryBlobStore;
pub use in_memory_checkpoint_repository::InMemoryCheckpointRepository;
pub use in_memory_custody_repository::InMemoryCustodyRepository;
pub use in_memory_evidence_lock_coordinator::InMemoryEvidenceLockCoordinator;
pub use in_memory_evidence_repository::InMemoryEvidenceRepository;
pub use in_memory_ledger_repository::InMemoryLedgerRepository;
pub use in_memory_retention_repository::{
    InMemoryArchiveRepository, InMemoryLegalHoldRepository, InMemoryRetentionPolicyRepository,
};
pub use postgres_checkpoint_repository::PostgresCheckpointRepository;
pub use postgres_compliance_repository::PostgresComplianceRepository;
pub use postgres_custody_repository::PostgresCustodyRepository;
pub use postgres_ledger_repository::PostgresLedgerRepository;
pub use redis_evidence_lock_coordinator::RedisEvidenceLockCoordinator;
pub use tracing_compliance_notifier::TracingComplianceNotifier;
