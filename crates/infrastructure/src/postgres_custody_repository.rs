use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use custodia_application::CustodyRepository;
use custodia_core::{AppError, AppResult, EvidenceId};
use custodia_domain::{CustodyAction, CustodyEntry};

/// PostgreSQL-backed adapter for per-evidence custody entries.
#[derive(Clone)]
pub struct PostgresCustodyRepository {
    pool: PgPool,
}

impl PostgresCustodyRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CustodyEntryRow {
    evidence_id: uuid::Uuid,
    sequence_no: i64,
    action: String,
    from_custodian: Option<String>,
    to_custodian: Option<String>,
    from_location: Option<String>,
    to_location: Option<String>,
    occurred_at: DateTime<Utc>,
    recorded_by: String,
    note: Option<String>,
}

impl CustodyEntryRow {
    fn try_into_entry(self) -> AppResult<CustodyEntry> {
        let sequence_no = u64::try_from(self.sequence_no).map_err(|error| {
            AppError::Internal(format!(
                "negative sequence_no '{}' in custody_entries: {error}",
                self.sequence_no
            ))
        })?;

        Ok(CustodyEntry::from_stored(
            EvidenceId::from_uuid(self.evidence_id),
            sequence_no,
            CustodyAction::from_str(self.action.as_str())?,
            self.from_custodian,
            self.to_custodian,
            self.from_location,
            self.to_location,
            self.occurred_at,
            self.recorded_by,
            self.note,
        ))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        evidence_id,
        sequence_no,
        action,
        from_custodian,
        to_custodian,
        from_location,
        to_location,
        occurred_at,
        recorded_by,
        note
    FROM custody_entries
"#;

#[async_trait]
impl CustodyRepository for PostgresCustodyRepository {
    async fn insert(&self, entry: &CustodyEntry) -> AppResult<()> {
        let sequence_no = i64::try_from(entry.sequence_no()).map_err(|error| {
            AppError::Validation(format!(
                "custody sequence_no '{}' exceeds storage range: {error}",
                entry.sequence_no()
            ))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO custody_entries (
                evidence_id,
                sequence_no,
                action,
                from_custodian,
                to_custodian,
                from_location,
                to_location,
                occurred_at,
                recorded_by,
                note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (evidence_id, sequence_no)
            DO NOTHING
            "#,
        )
        .bind(entry.evidence_id().as_uuid())
        .bind(sequence_no)
        .bind(entry.action().as_str())
        .bind(entry.from_custodian())
        .bind(entry.to_custodian())
        .bind(entry.from_location())
        .bind(entry.to_location())
        .bind(entry.occurred_at())
        .bind(entry.recorded_by())
        .bind(entry.note())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!(
                "failed to commit custody entry ({}, {}): {error}",
                entry.evidence_id(),
                entry.sequence_no()
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "custody entry ({}, {}) already exists",
                entry.evidence_id(),
                entry.sequence_no()
            )));
        }

        Ok(())
    }

    async fn entries_for_evidence(
        &self,
        evidence_id: EvidenceId,
    ) -> AppResult<Vec<CustodyEntry>> {
        let query = format!("{SELECT_COLUMNS} WHERE evidence_id = $1 ORDER BY sequence_no ASC");
        let rows = sqlx::query_as::<_, CustodyEntryRow>(query.as_str())
            .bind(evidence_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::StorageUnavailable(format!(
                    "failed to read custody entries for evidence '{evidence_id}': {error}"
                ))
            })?;

        rows.into_iter().map(CustodyEntryRow::try_into_entry).collect()
    }

    async fn last_entry(&self, evidence_id: EvidenceId) -> AppResult<Option<CustodyEntry>> {
        let query =
            format!("{SELECT_COLUMNS} WHERE evidence_id = $1 ORDER BY sequence_no DESC LIMIT 1");
        let row = sqlx::query_as::<_, CustodyEntryRow>(query.as_str())
            .bind(evidence_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::StorageUnavailable(format!(
                    "failed to read latest custody entry for evidence '{evidence_id}': {error}"
                ))
            })?;

        row.map(CustodyEntryRow::try_into_entry).transpose()
    }
}
