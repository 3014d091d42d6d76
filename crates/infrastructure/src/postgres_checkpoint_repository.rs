use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use custodia_application::{BrokenRange, CheckpointRepository, VerificationCheckpoint};
use custodia_core::{AppError, AppResult, PartitionId};

/// PostgreSQL-backed adapter for verification checkpoints and broken-range
/// bookkeeping.
#[derive(Clone)]
pub struct PostgresCheckpointRepository {
    pool: PgPool,
}

impl PostgresCheckpointRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct BrokenRangeRow {
    partition_id: uuid::Uuid,
    from_sequence: i64,
    to_sequence: i64,
    reason: String,
}

fn to_u64(value: i64, column: &str) -> AppResult<u64> {
    u64::try_from(value).map_err(|error| {
        AppError::Internal(format!("negative {column} '{value}' in storage: {error}"))
    })
}

fn to_i64(sequence_no: u64) -> i64 {
    i64::try_from(sequence_no).unwrap_or(i64::MAX)
}

#[async_trait]
impl CheckpointRepository for PostgresCheckpointRepository {
    async fn load(&self, partition_id: PartitionId) -> AppResult<Option<VerificationCheckpoint>> {
        let row = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT sequence_no, entry_hash
            FROM verification_checkpoints
            WHERE partition_id = $1
            "#,
        )
        .bind(partition_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!(
                "failed to load checkpoint for partition '{partition_id}': {error}"
            ))
        })?;

        row.map(|(sequence_no, entry_hash)| {
            Ok(VerificationCheckpoint {
                partition_id,
                sequence_no: to_u64(sequence_no, "sequence_no")?,
                entry_hash,
            })
        })
        .transpose()
    }

    async fn store(&self, checkpoint: VerificationCheckpoint) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_checkpoints (partition_id, sequence_no, entry_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (partition_id)
            DO UPDATE SET sequence_no = EXCLUDED.sequence_no, entry_hash = EXCLUDED.entry_hash
            "#,
        )
        .bind(checkpoint.partition_id.as_uuid())
        .bind(to_i64(checkpoint.sequence_no))
        .bind(checkpoint.entry_hash.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!(
                "failed to store checkpoint for partition '{}': {error}",
                checkpoint.partition_id
            ))
        })?;

        Ok(())
    }

    async fn record_broken_range(&self, range: BrokenRange) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO broken_ranges (partition_id, from_sequence, to_sequence, reason)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (partition_id, from_sequence)
            DO UPDATE SET to_sequence = EXCLUDED.to_sequence, reason = EXCLUDED.reason
            "#,
        )
        .bind(range.partition_id.as_uuid())
        .bind(to_i64(range.from_sequence))
        .bind(to_i64(range.to_sequence))
        .bind(range.reason.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!(
                "failed to record broken range for partition '{}': {error}",
                range.partition_id
            ))
        })?;

        Ok(())
    }

    async fn list_broken_ranges(&self) -> AppResult<Vec<BrokenRange>> {
        let rows = sqlx::query_as::<_, BrokenRangeRow>(
            r#"
            SELECT partition_id, from_sequence, to_sequence, reason
            FROM broken_ranges
            ORDER BY partition_id, from_sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!("failed to list broken ranges: {error}"))
        })?;

        rows.into_iter()
            .map(|row| {
                Ok(BrokenRange {
                    partition_id: PartitionId::from_uuid(row.partition_id),
                    from_sequence: to_u64(row.from_sequence, "from_sequence")?,
                    to_sequence: to_u64(row.to_sequence, "to_sequence")?,
                    reason: row.reason,
                })
            })
            .collect()
    }
}
