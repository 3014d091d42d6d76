use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use custodia_application::LedgerRepository;
use custodia_core::{AppError, AppResult, PartitionId};
use custodia_domain::{AuditAction, AuditEntry, ChainTail};

/// PostgreSQL-backed adapter for the append-only audit ledger.
///
/// The `(partition_id, sequence_no)` primary key is the serialization
/// point: a losing concurrent append hits `ON CONFLICT DO NOTHING`, is
/// surfaced as `Conflict`, and retries against the new tail.
#[derive(Clone)]
pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditEntryRow {
    partition_id: uuid::Uuid,
    sequence_no: i64,
    recorded_at: DateTime<Utc>,
    actor_subject: String,
    action: String,
    entity_type: String,
    entity_id: String,
    payload_digest: String,
    prev_hash: String,
    this_hash: String,
}

impl AuditEntryRow {
    fn try_into_entry(self) -> AppResult<AuditEntry> {
        let sequence_no = u64::try_from(self.sequence_no).map_err(|error| {
            AppError::Internal(format!(
                "negative sequence_no '{}' in audit_entries: {error}",
                self.sequence_no
            ))
        })?;

        Ok(AuditEntry::from_stored(
            PartitionId::from_uuid(self.partition_id),
            sequence_no,
            self.recorded_at,
            self.actor_subject,
            AuditAction::from_str(self.action.as_str())?,
            self.entity_type,
            self.entity_id,
            self.payload_digest,
            self.prev_hash,
            self.this_hash,
        ))
    }
}

fn to_i64(sequence_no: u64) -> i64 {
    i64::try_from(sequence_no).unwrap_or(i64::MAX)
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn tail(&self, partition_id: PartitionId) -> AppResult<Option<ChainTail>> {
        let row = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT sequence_no, this_hash
            FROM audit_entries
            WHERE partition_id = $1
            ORDER BY sequence_no DESC
            LIMIT 1
            "#,
        )
        .bind(partition_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!(
                "failed to read ledger tail for partition '{partition_id}': {error}"
            ))
        })?;

        row.map(|(sequence_no, entry_hash)| {
            let sequence_no = u64::try_from(sequence_no).map_err(|error| {
                AppError::Internal(format!(
                    "negative sequence_no '{sequence_no}' in audit_entries: {error}"
                ))
            })?;
            Ok(ChainTail {
                sequence_no,
                entry_hash,
            })
        })
        .transpose()
    }

    async fn insert(&self, entry: &AuditEntry) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_entries (
                partition_id,
                sequence_no,
                recorded_at,
                actor_subject,
                action,
                entity_type,
                entity_id,
                payload_digest,
                prev_hash,
                this_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (partition_id, sequence_no)
            DO NOTHING
            "#,
        )
        .bind(entry.partition_id().as_uuid())
        .bind(to_i64(entry.sequence_no()))
        .bind(entry.recorded_at())
        .bind(entry.actor_subject())
        .bind(entry.action().as_str())
        .bind(entry.entity_type())
        .bind(entry.entity_id())
        .bind(entry.payload_digest())
        .bind(entry.prev_hash())
        .bind(entry.this_hash())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!(
                "failed to commit audit entry ({}, {}): {error}",
                entry.partition_id(),
                entry.sequence_no()
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "audit entry ({}, {}) already exists",
                entry.partition_id(),
                entry.sequence_no()
            )));
        }

        Ok(())
    }

    async fn entries_in_range(
        &self,
        partition_id: PartitionId,
        from_sequence: u64,
        to_sequence: u64,
    ) -> AppResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntryRow>(
            r#"
            SELECT
                partition_id,
                sequence_no,
                recorded_at,
                actor_subject,
                action,
                entity_type,
                entity_id,
                payload_digest,
                prev_hash,
                this_hash
            FROM audit_entries
            WHERE partition_id = $1
                AND sequence_no BETWEEN $2 AND $3
            ORDER BY sequence_no ASC
            "#,
        )
        .bind(partition_id.as_uuid())
        .bind(to_i64(from_sequence))
        .bind(to_i64(to_sequence))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!(
                "failed to read ledger range for partition '{partition_id}': {error}"
            ))
        })?;

        rows.into_iter().map(AuditEntryRow::try_into_entry).collect()
    }

    async fn entries_for_entity(
        &self,
        partition_id: PartitionId,
        entity_type: &str,
        entity_id: &str,
    ) -> AppResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntryRow>(
            r#"
            SELECT
                partition_id,
                sequence_no,
                recorded_at,
                actor_subject,
                action,
                entity_type,
                entity_id,
                payload_digest,
                prev_hash,
                this_hash
            FROM audit_entries
            WHERE partition_id = $1
                AND entity_type = $2
                AND entity_id = $3
            ORDER BY sequence_no ASC
            "#,
        )
        .bind(partition_id.as_uuid())
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!(
                "failed to read entity entries for partition '{partition_id}': {error}"
            ))
        })?;

        rows.into_iter().map(AuditEntryRow::try_into_entry).collect()
    }

    async fn count_entries(&self) -> AppResult<u64> {
        let count = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM audit_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::StorageUnavailable(format!("failed to count audit entries: {error}"))
            })?;

        Ok(u64::try_from(count.0).unwrap_or_default())
    }

    async fn partitions(&self) -> AppResult<Vec<PartitionId>> {
        let rows = sqlx::query_as::<_, (uuid::Uuid,)>(
            "SELECT DISTINCT partition_id FROM audit_entries ORDER BY partition_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!("failed to list ledger partitions: {error}"))
        })?;

        Ok(rows
            .into_iter()
            .map(|(partition_id,)| PartitionId::from_uuid(partition_id))
            .collect())
    }
}
