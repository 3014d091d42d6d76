use chrono::{DateTime, Utc};
use custodia_core::{AppError, AppResult, EvidenceId, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Record of one evidence payload moved into the archive store.
///
/// `archive_hash` is the content digest verified both when the copy lands in
/// the archive store and again before any restore; the record survives the
/// restore for audit purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    evidence_id: EvidenceId,
    archived_at: DateTime<Utc>,
    archive_hash: NonEmptyString,
    storage_ref: NonEmptyString,
    restored_at: Option<DateTime<Utc>>,
}

impl ArchiveRecord {
    /// Creates a record for a freshly archived payload.
    pub fn new(
        evidence_id: EvidenceId,
        archived_at: DateTime<Utc>,
        archive_hash: impl Into<String>,
        storage_ref: impl Into<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            evidence_id,
            archived_at,
            archive_hash: NonEmptyString::new(archive_hash)?,
            storage_ref: NonEmptyString::new(storage_ref)?,
            restored_at: None,
        })
    }

    /// Reassembles a persisted archive record.
    #[must_use]
    pub fn from_stored(
        evidence_id: EvidenceId,
        archived_at: DateTime<Utc>,
        archive_hash: NonEmptyString,
        storage_ref: NonEmptyString,
        restored_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            evidence_id,
            archived_at,
            archive_hash,
            storage_ref,
            restored_at,
        }
    }

    /// Returns the archived evidence identifier.
    #[must_use]
    pub fn evidence_id(&self) -> EvidenceId {
        self.evidence_id
    }

    /// Returns when the payload was archived.
    #[must_use]
    pub fn archived_at(&self) -> DateTime<Utc> {
        self.archived_at
    }

    /// Returns the content digest recorded at archival time.
    #[must_use]
    pub fn archive_hash(&self) -> &str {
        self.archive_hash.as_str()
    }

    /// Returns the archive store reference.
    #[must_use]
    pub fn storage_ref(&self) -> &str {
        self.storage_ref.as_str()
    }

    /// Returns when the payload was restored, if it has been.
    #[must_use]
    pub fn restored_at(&self) -> Option<DateTime<Utc>> {
        self.restored_at
    }

    /// Marks the record restored.
    pub fn mark_restored(&mut self, restored_at: DateTime<Utc>) -> AppResult<()> {
        if self.restored_at.is_some() {
            return Err(AppError::Conflict(format!(
                "archive record for evidence '{}' is already restored",
                self.evidence_id
            )));
        }

        self.restored_at = Some(restored_at);
        Ok(())
    }
}
