//! Shared fake port implementations for service tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custodia_core::{AppError, AppResult, EvidenceId, PartitionId};
use custodia_domain::{
    ArchiveRecord, AuditEntry, ChainTail, CustodyEntry, Disposition, EvidenceItem, LegalHold,
    LegalHoldId, RetentionPolicy, RetentionPolicyId, payload_digest,
};
use serde_json::json;
use tokio::sync::Mutex;

use crate::archival_ports::{BlobStore, EvidenceLock, EvidenceLockCoordinator};
use crate::custody_ports::{CustodyRepository, EvidenceRepository};
use crate::ledger_ports::{
    BrokenRange, CheckpointRepository, LedgerRepository, VerificationCheckpoint,
};
use crate::notify::{ComplianceEvent, ComplianceNotifier};
use crate::retention_ports::{ArchiveRepository, LegalHoldRepository, RetentionPolicyRepository};

#[derive(Default)]
pub struct FakeLedgerRepository {
    entries: Mutex<BTreeMap<(PartitionId, u64), AuditEntry>>,
    stale_tail_reads: AtomicU32,
    fail_inserts: AtomicU32,
}

impl FakeLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves this many tail reads one entry behind the committed tail,
    /// simulating a concurrent writer landing first.
    pub fn contend_for(&self, reads: u32) {
        self.stale_tail_reads.store(reads, Ordering::SeqCst);
    }

    pub fn fail_next_inserts(&self, count: u32) {
        self.fail_inserts.store(count, Ordering::SeqCst);
    }

    /// Overwrites the stored payload digest at one position, simulating
    /// post-commit tampering with the backing store.
    pub async fn tamper_payload(&self, partition_id: PartitionId, sequence_no: u64) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(&(partition_id, sequence_no)) {
            let tampered = AuditEntry::from_stored(
                entry.partition_id(),
                entry.sequence_no(),
                entry.recorded_at(),
                entry.actor_subject().to_owned(),
                entry.action(),
                entry.entity_type().to_owned(),
                entry.entity_id().to_owned(),
                payload_digest(&json!({"tampered": true})),
                entry.prev_hash().to_owned(),
                entry.this_hash().to_owned(),
            );
            entries.insert((partition_id, sequence_no), tampered);
        }
    }

    /// Removes one stored entry, simulating a lost sequence number.
    pub async fn remove_entry(&self, partition_id: PartitionId, sequence_no: u64) {
        self.entries.lock().await.remove(&(partition_id, sequence_no));
    }
}

#[async_trait]
impl LedgerRepository for FakeLedgerRepository {
    async fn tail(&self, partition_id: PartitionId) -> AppResult<Option<ChainTail>> {
        let entries = self.entries.lock().await;
        let mut tail = entries
            .range((partition_id, 0)..=(partition_id, u64::MAX))
            .next_back()
            .map(|(_, entry)| entry.tail());

        if self.stale_tail_reads.load(Ordering::SeqCst) > 0 {
            self.stale_tail_reads.fetch_sub(1, Ordering::SeqCst);
            tail = match tail {
                Some(current) if current.sequence_no > 0 => entries
                    .get(&(partition_id, current.sequence_no - 1))
                    .map(AuditEntry::tail),
                _ => None,
            };
        }

        Ok(tail)
    }

    async fn insert(&self, entry: &AuditEntry) -> AppResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) > 0 {
            self.fail_inserts.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::StorageUnavailable(
                "backing store cannot commit".to_owned(),
            ));
        }

        let key = (entry.partition_id(), entry.sequence_no());
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "sequence {} already committed",
                entry.sequence_no()
            )));
        }

        entries.insert(key, entry.clone());
        Ok(())
    }

    async fn entries_in_range(
        &self,
        partition_id: PartitionId,
        from_sequence: u64,
        to_sequence: u64,
    ) -> AppResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .range((partition_id, from_sequence)..=(partition_id, to_sequence))
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn entries_for_entity(
        &self,
        partition_id: PartitionId,
        entity_type: &str,
        entity_id: &str,
    ) -> AppResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .range((partition_id, 0)..=(partition_id, u64::MAX))
            .filter(|(_, entry)| {
                entry.entity_type() == entity_type && entry.entity_id() == entity_id
            })
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn count_entries(&self) -> AppResult<u64> {
        Ok(self.entries.lock().await.len() as u64)
    }

    async fn partitions(&self) -> AppResult<Vec<PartitionId>> {
        let entries = self.entries.lock().await;
        let mut partitions: Vec<PartitionId> =
            entries.keys().map(|(partition_id, _)| *partition_id).collect();
        partitions.dedup();
        Ok(partitions)
    }
}

#[derive(Default)]
pub struct FakeCheckpointRepository {
    checkpoints: Mutex<HashMap<PartitionId, VerificationCheckpoint>>,
    broken_ranges: Mutex<Vec<BrokenRange>>,
}

impl FakeCheckpointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn checkpoint_for(&self, partition_id: PartitionId) -> Option<VerificationCheckpoint> {
        self.checkpoints.lock().await.get(&partition_id).cloned()
    }
}

#[async_trait]
impl CheckpointRepository for FakeCheckpointRepository {
    async fn load(&self, partition_id: PartitionId) -> AppResult<Option<VerificationCheckpoint>> {
        Ok(self.checkpoints.lock().await.get(&partition_id).cloned())
    }

    async fn store(&self, checkpoint: VerificationCheckpoint) -> AppResult<()> {
        self.checkpoints
            .lock()
            .await
            .insert(checkpoint.partition_id, checkpoint);
        Ok(())
    }

    async fn record_broken_range(&self, range: BrokenRange) -> AppResult<()> {
        let mut ranges = self.broken_ranges.lock().await;
        ranges.retain(|existing| {
            existing.partition_id != range.partition_id
                || existing.from_sequence != range.from_sequence
        });
        ranges.push(range);
        Ok(())
    }

    async fn list_broken_ranges(&self) -> AppResult<Vec<BrokenRange>> {
        Ok(self.broken_ranges.lock().await.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ComplianceEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .await
            .iter()
            .map(ComplianceEvent::kind)
            .collect()
    }
}

#[async_trait]
impl ComplianceNotifier for RecordingNotifier {
    async fn dispatch(&self, event: ComplianceEvent) -> AppResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCustodyRepository {
    entries: Mutex<BTreeMap<(EvidenceId, u64), CustodyEntry>>,
}

impl FakeCustodyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustodyRepository for FakeCustodyRepository {
    async fn insert(&self, entry: &CustodyEntry) -> AppResult<()> {
        let key = (entry.evidence_id(), entry.sequence_no());
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "custody sequence {} already recorded",
                entry.sequence_no()
            )));
        }

        entries.insert(key, entry.clone());
        Ok(())
    }

    async fn entries_for_evidence(
        &self,
        evidence_id: EvidenceId,
    ) -> AppResult<Vec<CustodyEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .range((evidence_id, 0)..=(evidence_id, u64::MAX))
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn last_entry(&self, evidence_id: EvidenceId) -> AppResult<Option<CustodyEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .range((evidence_id, 0)..=(evidence_id, u64::MAX))
            .next_back()
            .map(|(_, entry)| entry.clone()))
    }
}

#[derive(Default)]
pub struct FakeEvidenceRepository {
    items: Mutex<HashMap<EvidenceId, EvidenceItem>>,
}

impl FakeEvidenceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvidenceRepository for FakeEvidenceRepository {
    async fn register(&self, item: &EvidenceItem) -> AppResult<()> {
        let mut items = self.items.lock().await;
        if items.contains_key(&item.id()) {
            return Err(AppError::Conflict(format!(
                "evidence '{}' is already registered",
                item.id()
            )));
        }

        items.insert(item.id(), item.clone());
        Ok(())
    }

    async fn find(&self, evidence_id: EvidenceId) -> AppResult<Option<EvidenceItem>> {
        Ok(self.items.lock().await.get(&evidence_id).cloned())
    }

    async fn update_disposition(
        &self,
        evidence_id: EvidenceId,
        disposition: Disposition,
    ) -> AppResult<()> {
        let mut items = self.items.lock().await;
        let Some(item) = items.remove(&evidence_id) else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' is not registered"
            )));
        };

        items.insert(evidence_id, item.with_disposition(disposition));
        Ok(())
    }

    async fn update_storage_ref(
        &self,
        evidence_id: EvidenceId,
        storage_ref: &str,
    ) -> AppResult<()> {
        let mut items = self.items.lock().await;
        let Some(item) = items.remove(&evidence_id) else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' is not registered"
            )));
        };

        items.insert(evidence_id, item.with_storage_ref(storage_ref)?);
        Ok(())
    }

    async fn list_by_disposition(
        &self,
        disposition: Disposition,
        limit: usize,
    ) -> AppResult<Vec<EvidenceItem>> {
        let items = self.items.lock().await;
        let mut listed: Vec<EvidenceItem> = items
            .values()
            .filter(|item| item.disposition() == disposition)
            .cloned()
            .collect();
        listed.sort_by_key(|item| (item.registered_at(), item.id()));
        listed.truncate(limit);
        Ok(listed)
    }
}

#[derive(Default)]
pub struct FakePolicyRepository {
    policies: Mutex<HashMap<RetentionPolicyId, RetentionPolicy>>,
}

impl FakePolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetentionPolicyRepository for FakePolicyRepository {
    async fn save(&self, policy: &RetentionPolicy) -> AppResult<()> {
        self.policies.lock().await.insert(policy.id(), policy.clone());
        Ok(())
    }

    async fn find(&self, policy_id: RetentionPolicyId) -> AppResult<Option<RetentionPolicy>> {
        Ok(self.policies.lock().await.get(&policy_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeHoldRepository {
    holds: Mutex<HashMap<LegalHoldId, LegalHold>>,
}

impl FakeHoldRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LegalHoldRepository for FakeHoldRepository {
    async fn save(&self, hold: &LegalHold) -> AppResult<()> {
        self.holds.lock().await.insert(hold.id(), hold.clone());
        Ok(())
    }

    async fn find(&self, hold_id: LegalHoldId) -> AppResult<Option<LegalHold>> {
        Ok(self.holds.lock().await.get(&hold_id).cloned())
    }

    async fn active_holds_for(
        &self,
        evidence_id: EvidenceId,
        partition_id: PartitionId,
    ) -> AppResult<Vec<LegalHold>> {
        let holds = self.holds.lock().await;
        Ok(holds
            .values()
            .filter(|hold| hold.is_active() && hold.applies_to(evidence_id, partition_id))
            .cloned()
            .collect())
    }

    async fn active_holds(&self) -> AppResult<Vec<LegalHold>> {
        let holds = self.holds.lock().await;
        Ok(holds.values().filter(|hold| hold.is_active()).cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeArchiveRepository {
    records: Mutex<HashMap<EvidenceId, ArchiveRecord>>,
}

impl FakeArchiveRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveRepository for FakeArchiveRepository {
    async fn save(&self, record: &ArchiveRecord) -> AppResult<()> {
        let mut records = self.records.lock().await;
        if records
            .get(&record.evidence_id())
            .is_some_and(|existing| existing.restored_at().is_none())
        {
            return Err(AppError::Conflict(format!(
                "evidence '{}' already has an unrestored archive record",
                record.evidence_id()
            )));
        }

        records.insert(record.evidence_id(), record.clone());
        Ok(())
    }

    async fn find(&self, evidence_id: EvidenceId) -> AppResult<Option<ArchiveRecord>> {
        Ok(self.records.lock().await.get(&evidence_id).cloned())
    }

    async fn mark_restored(
        &self,
        evidence_id: EvidenceId,
        restored_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(&evidence_id) else {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' has no archive record"
            )));
        };

        record.mark_restored(restored_at)
    }
}

#[derive(Default)]
pub struct FakeBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    next_ref: AtomicU64,
    corrupt_next_stores: AtomicU32,
}

impl FakeBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, storage_ref: &str, bytes: Vec<u8>) {
        self.blobs.lock().await.insert(storage_ref.to_owned(), bytes);
    }

    pub async fn contains(&self, storage_ref: &str) -> bool {
        self.blobs.lock().await.contains_key(storage_ref)
    }

    /// Flips the stored bytes behind a reference, simulating silent
    /// corruption in the store.
    pub async fn corrupt(&self, storage_ref: &str) {
        if let Some(bytes) = self.blobs.lock().await.get_mut(storage_ref) {
            bytes.push(0xFF);
        }
    }

    /// Silently corrupts the next stored payloads in flight, so the copy
    /// landing in the store no longer matches what was written.
    pub fn corrupt_next_stores(&self, count: u32) {
        self.corrupt_next_stores.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn store(&self, bytes: &[u8]) -> AppResult<String> {
        let mut stored = bytes.to_vec();
        if self.corrupt_next_stores.load(Ordering::SeqCst) > 0 {
            self.corrupt_next_stores.fetch_sub(1, Ordering::SeqCst);
            stored.push(0xFF);
        }

        let storage_ref = format!("mem://{}", self.next_ref.fetch_add(1, Ordering::SeqCst));
        self.blobs.lock().await.insert(storage_ref.clone(), stored);
        Ok(storage_ref)
    }

    async fn fetch(&self, storage_ref: &str) -> AppResult<Vec<u8>> {
        self.blobs
            .lock()
            .await
            .get(storage_ref)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no blob at '{storage_ref}'")))
    }

    async fn delete(&self, storage_ref: &str) -> AppResult<()> {
        self.blobs.lock().await.remove(storage_ref);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLockCoordinator {
    locks: Mutex<HashMap<EvidenceId, EvidenceLock>>,
    next_token: AtomicU64,
}

impl FakeLockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds the lock for one item on behalf of an out-of-band contender.
    pub async fn seize(&self, evidence_id: EvidenceId) -> EvidenceLock {
        let lock = EvidenceLock {
            evidence_id,
            token: format!("external-{}", self.next_token.fetch_add(1, Ordering::SeqCst)),
            holder_id: "external".to_owned(),
        };
        self.locks.lock().await.insert(evidence_id, lock.clone());
        lock
    }
}

#[async_trait]
impl EvidenceLockCoordinator for FakeLockCoordinator {
    async fn try_acquire(
        &self,
        evidence_id: EvidenceId,
        holder_id: &str,
        _lease_seconds: u32,
    ) -> AppResult<Option<EvidenceLock>> {
        let mut locks = self.locks.lock().await;
        if locks.contains_key(&evidence_id) {
            return Ok(None);
        }

        let lock = EvidenceLock {
            evidence_id,
            token: format!("{holder_id}:{}", self.next_token.fetch_add(1, Ordering::SeqCst)),
            holder_id: holder_id.to_owned(),
        };
        locks.insert(evidence_id, lock.clone());
        Ok(Some(lock))
    }

    async fn release(&self, lock: &EvidenceLock) -> AppResult<()> {
        let mut locks = self.locks.lock().await;
        if locks
            .get(&lock.evidence_id)
            .is_some_and(|held| held.token == lock.token)
        {
            locks.remove(&lock.evidence_id);
        }
        Ok(())
    }
}
