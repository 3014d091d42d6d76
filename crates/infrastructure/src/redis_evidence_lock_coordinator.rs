//! Redis-backed distributed lock coordinator for evidence items.

use async_trait::async_trait;
use custodia_application::{EvidenceLock, EvidenceLockCoordinator};
use custodia_core::{AppError, AppResult, EvidenceId};
use redis::{AsyncCommands, Script};

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of per-evidence lock coordination.
///
/// Lets multiple worker instances serialize custody transitions and
/// lifecycle actions on one item; the lease TTL bounds a lock lost to a
/// crashed holder.
#[derive(Clone)]
pub struct RedisEvidenceLockCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisEvidenceLockCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, evidence_id: EvidenceId) -> String {
        format!("{}:{evidence_id}", self.key_prefix)
    }
}

#[async_trait]
impl EvidenceLockCoordinator for RedisEvidenceLockCoordinator {
    async fn try_acquire(
        &self,
        evidence_id: EvidenceId,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<EvidenceLock>> {
        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "evidence lock holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "evidence lock lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let key = self.key_for(evidence_id);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let acquired: bool = connection
            .set_nx(key.as_str(), token.as_str())
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire evidence lock: {error}"))
            })?;

        if !acquired {
            return Ok(None);
        }

        connection
            .expire::<_, ()>(key.as_str(), i64::from(lease_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to set evidence lock ttl: {error}"))
            })?;

        Ok(Some(EvidenceLock {
            evidence_id,
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release(&self, lock: &EvidenceLock) -> AppResult<()> {
        let key = self.key_for(lock.evidence_id);
        let script = Script::new(RELEASE_LOCK_SCRIPT);

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        script
            .key(key)
            .arg(lock.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release evidence lock: {error}"))
            })?;

        Ok(())
    }
}
