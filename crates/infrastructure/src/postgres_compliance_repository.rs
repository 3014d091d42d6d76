//! PostgreSQL-backed adapter for evidence items, retention policies, legal
//! holds and archive records.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use custodia_application::{
    ArchiveRepository, EvidenceRepository, LegalHoldRepository, RetentionPolicyRepository,
};
use custodia_core::{AppError, AppResult, EvidenceId, NonEmptyString, PartitionId};
use custodia_domain::{
    ArchiveRecord, Disposition, EvidenceItem, EvidenceItemInput, HoldScope, LegalHold,
    LegalHoldId, RetentionAnchor, RetentionPeriod, RetentionPolicy, RetentionPolicyId,
    RetentionPolicyInput,
};

/// One adapter over the compliance tables sharing a connection pool.
#[derive(Clone)]
pub struct PostgresComplianceRepository {
    pool: PgPool,
}

impl PostgresComplianceRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct EvidenceItemRow {
    id: uuid::Uuid,
    partition_id: uuid::Uuid,
    category: String,
    storage_ref: String,
    retention_policy_id: uuid::Uuid,
    registered_at: DateTime<Utc>,
    disposition: String,
}

impl EvidenceItemRow {
    fn try_into_item(self) -> AppResult<EvidenceItem> {
        let disposition = Disposition::from_str(self.disposition.as_str())?;
        let item = EvidenceItem::new(EvidenceItemInput {
            id: EvidenceId::from_uuid(self.id),
            partition_id: PartitionId::from_uuid(self.partition_id),
            category: self.category,
            storage_ref: self.storage_ref,
            retention_policy_id: RetentionPolicyId::from_uuid(self.retention_policy_id),
            registered_at: self.registered_at,
        })?;
        Ok(item.with_disposition(disposition))
    }
}

#[derive(Debug, FromRow)]
struct RetentionPolicyRow {
    id: uuid::Uuid,
    entity_type: String,
    period_type: String,
    period_days: Option<i32>,
    anchor: String,
    auto_archive: bool,
    auto_delete: bool,
}

impl RetentionPolicyRow {
    fn try_into_policy(self) -> AppResult<RetentionPolicy> {
        let period = match self.period_type.as_str() {
            "fixed" => {
                let days = self.period_days.ok_or_else(|| {
                    AppError::Internal(format!(
                        "fixed retention policy '{}' has no period_days",
                        self.id
                    ))
                })?;
                RetentionPeriod::Fixed {
                    days: u32::try_from(days).map_err(|error| {
                        AppError::Internal(format!(
                            "negative period_days '{days}' in retention_policies: {error}"
                        ))
                    })?,
                }
            }
            "permanent" => RetentionPeriod::Permanent,
            "legal_hold" => RetentionPeriod::LegalHold,
            other => {
                return Err(AppError::Internal(format!(
                    "unknown period_type '{other}' in retention_policies"
                )));
            }
        };

        let anchor = match self.anchor.as_str() {
            "evidence_registered" => RetentionAnchor::EvidenceRegistered,
            "last_custody_action" => RetentionAnchor::LastCustodyAction,
            other => {
                return Err(AppError::Internal(format!(
                    "unknown anchor '{other}' in retention_policies"
                )));
            }
        };

        RetentionPolicy::new(RetentionPolicyInput {
            id: RetentionPolicyId::from_uuid(self.id),
            entity_type: self.entity_type,
            period,
            anchor,
            auto_archive: self.auto_archive,
            auto_delete: self.auto_delete,
        })
    }
}

fn period_columns(period: RetentionPeriod) -> (&'static str, Option<i32>) {
    match period {
        RetentionPeriod::Fixed { days } => ("fixed", Some(i32::try_from(days).unwrap_or(i32::MAX))),
        RetentionPeriod::Permanent => ("permanent", None),
        RetentionPeriod::LegalHold => ("legal_hold", None),
    }
}

#[derive(Debug, FromRow)]
struct LegalHoldRow {
    id: uuid::Uuid,
    scope_type: String,
    scope_evidence_id: Option<uuid::Uuid>,
    scope_partition_id: Option<uuid::Uuid>,
    reason: String,
    created_by: String,
    created_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
}

impl LegalHoldRow {
    fn try_into_hold(self) -> AppResult<LegalHold> {
        let scope = match self.scope_type.as_str() {
            "evidence" => HoldScope::Evidence {
                evidence_id: EvidenceId::from_uuid(self.scope_evidence_id.ok_or_else(|| {
                    AppError::Internal(format!(
                        "evidence-scoped hold '{}' has no scope_evidence_id",
                        self.id
                    ))
                })?),
            },
            "case" => HoldScope::Case {
                partition_id: PartitionId::from_uuid(self.scope_partition_id.ok_or_else(
                    || {
                        AppError::Internal(format!(
                            "case-scoped hold '{}' has no scope_partition_id",
                            self.id
                        ))
                    },
                )?),
            },
            other => {
                return Err(AppError::Internal(format!(
                    "unknown scope_type '{other}' in legal_holds"
                )));
            }
        };

        Ok(LegalHold::from_stored(
            LegalHoldId::from_uuid(self.id),
            scope,
            NonEmptyString::new(self.reason)?,
            self.created_by,
            self.created_at,
            self.released_at,
        ))
    }
}

fn scope_columns(scope: HoldScope) -> (&'static str, Option<uuid::Uuid>, Option<uuid::Uuid>) {
    match scope {
        HoldScope::Evidence { evidence_id } => ("evidence", Some(evidence_id.as_uuid()), None),
        HoldScope::Case { partition_id } => ("case", None, Some(partition_id.as_uuid())),
    }
}

#[derive(Debug, FromRow)]
struct ArchiveRecordRow {
    evidence_id: uuid::Uuid,
    archived_at: DateTime<Utc>,
    archive_hash: String,
    storage_ref: String,
    restored_at: Option<DateTime<Utc>>,
}

impl ArchiveRecordRow {
    fn try_into_record(self) -> AppResult<ArchiveRecord> {
        Ok(ArchiveRecord::from_stored(
            EvidenceId::from_uuid(self.evidence_id),
            self.archived_at,
            NonEmptyString::new(self.archive_hash)?,
            NonEmptyString::new(self.storage_ref)?,
            self.restored_at,
        ))
    }
}

#[async_trait]
impl EvidenceRepository for PostgresComplianceRepository {
    async fn register(&self, item: &EvidenceItem) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO evidence_items (
                id,
                partition_id,
                category,
                storage_ref,
                retention_policy_id,
                registered_at,
                disposition
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id)
            DO NOTHING
            "#,
        )
        .bind(item.id().as_uuid())
        .bind(item.partition_id().as_uuid())
        .bind(item.category())
        .bind(item.storage_ref())
        .bind(item.retention_policy_id().as_uuid())
        .bind(item.registered_at())
        .bind(item.disposition().as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to register evidence '{}': {error}", item.id()))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "evidence '{}' is already registered",
                item.id()
            )));
        }

        Ok(())
    }

    async fn find(&self, evidence_id: EvidenceId) -> AppResult<Option<EvidenceItem>> {
        let row = sqlx::query_as::<_, EvidenceItemRow>(
            r#"
            SELECT id, partition_id, category, storage_ref, retention_policy_id,
                   registered_at, disposition
            FROM evidence_items
            WHERE id = $1
            "#,
        )
        .bind(evidence_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find evidence '{evidence_id}': {error}"))
        })?;

        row.map(EvidenceItemRow::try_into_item).transpose()
    }

    async fn update_disposition(
        &self,
        evidence_id: EvidenceId,
        disposition: Disposition,
    ) -> AppResult<()> {
        let result = sqlx::query("UPDATE evidence_items SET disposition = $2 WHERE id = $1")
            .bind(evidence_id.as_uuid())
            .bind(disposition.as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to update disposition for evidence '{evidence_id}': {error}"
                ))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' is not registered"
            )));
        }

        Ok(())
    }

    async fn update_storage_ref(
        &self,
        evidence_id: EvidenceId,
        storage_ref: &str,
    ) -> AppResult<()> {
        let result = sqlx::query("UPDATE evidence_items SET storage_ref = $2 WHERE id = $1")
            .bind(evidence_id.as_uuid())
            .bind(storage_ref)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to update storage_ref for evidence '{evidence_id}': {error}"
                ))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "evidence '{evidence_id}' is not registered"
            )));
        }

        Ok(())
    }

    async fn list_by_disposition(
        &self,
        disposition: Disposition,
        limit: usize,
    ) -> AppResult<Vec<EvidenceItem>> {
        let capped_limit = i64::try_from(limit.min(10_000)).unwrap_or(10_000);
        let rows = sqlx::query_as::<_, EvidenceItemRow>(
            r#"
            SELECT id, partition_id, category, storage_ref, retention_policy_id,
                   registered_at, disposition
            FROM evidence_items
            WHERE disposition = $1
            ORDER BY registered_at ASC
            LIMIT $2
            "#,
        )
        .bind(disposition.as_str())
        .bind(capped_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list evidence items: {error}"))
        })?;

        rows.into_iter().map(EvidenceItemRow::try_into_item).collect()
    }
}

#[async_trait]
impl RetentionPolicyRepository for PostgresComplianceRepository {
    async fn save(&self, policy: &RetentionPolicy) -> AppResult<()> {
        let (period_type, period_days) = period_columns(policy.period());
        sqlx::query(
            r#"
            INSERT INTO retention_policies (
                id, entity_type, period_type, period_days, anchor, auto_archive, auto_delete
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id)
            DO UPDATE SET
                entity_type = EXCLUDED.entity_type,
                period_type = EXCLUDED.period_type,
                period_days = EXCLUDED.period_days,
                anchor = EXCLUDED.anchor,
                auto_archive = EXCLUDED.auto_archive,
                auto_delete = EXCLUDED.auto_delete
            "#,
        )
        .bind(policy.id().as_uuid())
        .bind(policy.entity_type())
        .bind(period_type)
        .bind(period_days)
        .bind(policy.anchor().as_str())
        .bind(policy.auto_archive())
        .bind(policy.auto_delete())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save retention policy '{}': {error}",
                policy.id()
            ))
        })?;

        Ok(())
    }

    async fn find(&self, policy_id: RetentionPolicyId) -> AppResult<Option<RetentionPolicy>> {
        let row = sqlx::query_as::<_, RetentionPolicyRow>(
            r#"
            SELECT id, entity_type, period_type, period_days, anchor, auto_archive, auto_delete
            FROM retention_policies
            WHERE id = $1
            "#,
        )
        .bind(policy_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find retention policy '{policy_id}': {error}"
            ))
        })?;

        row.map(RetentionPolicyRow::try_into_policy).transpose()
    }
}

#[async_trait]
impl LegalHoldRepository for PostgresComplianceRepository {
    async fn save(&self, hold: &LegalHold) -> AppResult<()> {
        let (scope_type, scope_evidence_id, scope_partition_id) = scope_columns(hold.scope());
        sqlx::query(
            r#"
            INSERT INTO legal_holds (
                id, scope_type, scope_evidence_id, scope_partition_id,
                reason, created_by, created_at, released_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id)
            DO UPDATE SET released_at = EXCLUDED.released_at
            "#,
        )
        .bind(hold.id().as_uuid())
        .bind(scope_type)
        .bind(scope_evidence_id)
        .bind(scope_partition_id)
        .bind(hold.reason())
        .bind(hold.created_by())
        .bind(hold.created_at())
        .bind(hold.released_at())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to save legal hold '{}': {error}", hold.id()))
        })?;

        Ok(())
    }

    async fn find(&self, hold_id: LegalHoldId) -> AppResult<Option<LegalHold>> {
        let row = sqlx::query_as::<_, LegalHoldRow>(
            r#"
            SELECT id, scope_type, scope_evidence_id, scope_partition_id,
                   reason, created_by, created_at, released_at
            FROM legal_holds
            WHERE id = $1
            "#,
        )
        .bind(hold_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find legal hold '{hold_id}': {error}"))
        })?;

        row.map(LegalHoldRow::try_into_hold).transpose()
    }

    async fn active_holds_for(
        &self,
        evidence_id: EvidenceId,
        partition_id: PartitionId,
    ) -> AppResult<Vec<LegalHold>> {
        let rows = sqlx::query_as::<_, LegalHoldRow>(
            r#"
            SELECT id, scope_type, scope_evidence_id, scope_partition_id,
                   reason, created_by, created_at, released_at
            FROM legal_holds
            WHERE released_at IS NULL
                AND (scope_evidence_id = $1 OR scope_partition_id = $2)
            ORDER BY created_at ASC
            "#,
        )
        .bind(evidence_id.as_uuid())
        .bind(partition_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list active holds for evidence '{evidence_id}': {error}"
            ))
        })?;

        rows.into_iter().map(LegalHoldRow::try_into_hold).collect()
    }

    async fn active_holds(&self) -> AppResult<Vec<LegalHold>> {
        let rows = sqlx::query_as::<_, LegalHoldRow>(
            r#"
            SELECT id, scope_type, scope_evidence_id, scope_partition_id,
                   reason, created_by, created_at, released_at
            FROM legal_holds
            WHERE released_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list active holds: {error}"))
        })?;

        rows.into_iter().map(LegalHoldRow::try_into_hold).collect()
    }
}

#[async_trait]
impl ArchiveRepository for PostgresComplianceRepository {
    async fn save(&self, record: &ArchiveRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO archive_records (
                evidence_id, archived_at, archive_hash, storage_ref, restored_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (evidence_id)
            DO UPDATE SET
                archived_at = EXCLUDED.archived_at,
                archive_hash = EXCLUDED.archive_hash,
                storage_ref = EXCLUDED.storage_ref,
                restored_at = EXCLUDED.restored_at
            WHERE archive_records.restored_at IS NOT NULL
            "#,
        )
        .bind(record.evidence_id().as_uuid())
        .bind(record.archived_at())
        .bind(record.archive_hash())
        .bind(record.storage_ref())
        .bind(record.restored_at())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save archive record for evidence '{}': {error}",
                record.evidence_id()
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "evidence '{}' already has an unrestored archive record",
                record.evidence_id()
            )));
        }

        Ok(())
    }

    async fn find(&self, evidence_id: EvidenceId) -> AppResult<Option<ArchiveRecord>> {
        let row = sqlx::query_as::<_, ArchiveRecordRow>(
            r#"
            SELECT evidence_id, archived_at, archive_hash, storage_ref, restored_at
            FROM archive_records
            WHERE evidence_id = $1
            "#,
        )
        .bind(evidence_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find archive record for evidence '{evidence_id}': {error}"
            ))
        })?;

        row.map(ArchiveRecordRow::try_into_record).transpose()
    }

    async fn mark_restored(
        &self,
        evidence_id: EvidenceId,
        restored_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE archive_records
            SET restored_at = $2
            WHERE evidence_id = $1 AND restored_at IS NULL
            "#,
        )
        .bind(evidence_id.as_uuid())
        .bind(restored_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to mark archive record restored for evidence '{evidence_id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "evidence '{evidence_id}' has no unrestored archive record"
            )));
        }

        Ok(())
    }
}
