//! Custodia retention and verification worker runtime.
//!
//! Periodically scans for due retention actions, executes them through the
//! archival/disposal executor, and runs a resumable integrity sweep over
//! every ledger partition. Evaluation is idempotent and every lifecycle
//! action re-checks its preconditions under the per-evidence lock, so a
//! crash-and-retry never double-executes an irreversible disposal.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use custodia_application::{
    ArchivalService, DisposalInput, EvidenceLockCoordinator, IntegrityService, LedgerService,
    RetentionService, RetentionWorkItem,
};
use custodia_core::{ActorIdentity, AppError, AppResult};
use custodia_domain::RetentionAction;
use custodia_infrastructure::{
    InMemoryBlobStore, InMemoryEvidenceLockCoordinator, PostgresCheckpointRepository,
    PostgresComplianceRepository, PostgresCustodyRepository, PostgresLedgerRepository,
    RedisEvidenceLockCoordinator, TracingComplianceNotifier,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    redis_url: Option<String>,
    worker_id: String,
    scan_limit: usize,
    poll_interval_ms: u64,
}

struct WorkerServices {
    retention: RetentionService,
    archival: ArchivalService,
    integrity: IntegrityService,
    ledger_repository: Arc<PostgresLedgerRepository>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    run_migrations(&pool).await?;
    let services = build_services(pool, &config)?;
    let actor = ActorIdentity::new("custodia.worker", "Retention Worker")?;

    info!(
        worker_id = %config.worker_id,
        scan_limit = config.scan_limit,
        poll_interval_ms = config.poll_interval_ms,
        redis_locking = config.redis_url.is_some(),
        "custodia-worker started"
    );

    loop {
        match services.retention.scan(&actor, Utc::now(), config.scan_limit).await {
            Ok(worklist) => {
                execute_worklist(&services, &actor, &config, worklist).await;
            }
            Err(error) => {
                warn!(worker_id = %config.worker_id, error = %error, "retention scan failed");
            }
        }

        run_verification_sweep(&services, &actor, &config).await;

        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

async fn execute_worklist(
    services: &WorkerServices,
    actor: &ActorIdentity,
    config: &WorkerConfig,
    worklist: Vec<RetentionWorkItem>,
) {
    for work_item in worklist {
        let outcome = match work_item.action {
            RetentionAction::Archive => services
                .archival
                .archive(actor, work_item.evidence_id)
                .await
                .map(|_| ()),
            RetentionAction::Delete => {
                services
                    .archival
                    .dispose(
                        actor,
                        work_item.evidence_id,
                        DisposalInput {
                            method: "scheduled_destruction".to_owned(),
                            authorized_by: actor.subject().to_owned(),
                        },
                    )
                    .await
            }
            RetentionAction::None => Ok(()),
        };

        match outcome {
            Ok(()) => {
                info!(
                    worker_id = %config.worker_id,
                    evidence_id = %work_item.evidence_id,
                    action = work_item.action.as_str(),
                    "retention action executed"
                );
            }
            Err(error) if error.is_retryable() => {
                info!(
                    worker_id = %config.worker_id,
                    evidence_id = %work_item.evidence_id,
                    error = %error,
                    "retention action contended; the next scan retries it"
                );
            }
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    evidence_id = %work_item.evidence_id,
                    action = work_item.action.as_str(),
                    error = %error,
                    "retention action failed"
                );
            }
        }
    }
}

async fn run_verification_sweep(
    services: &WorkerServices,
    actor: &ActorIdentity,
    config: &WorkerConfig,
) {
    use custodia_application::LedgerRepository;

    let partitions = match services.ledger_repository.partitions().await {
        Ok(partitions) => partitions,
        Err(error) => {
            warn!(worker_id = %config.worker_id, error = %error, "failed to list partitions");
            return;
        }
    };

    for partition_id in partitions {
        match services
            .integrity
            .verify_partition(actor, partition_id, None)
            .await
        {
            Ok(report) if report.valid => {}
            Ok(report) => {
                warn!(
                    worker_id = %config.worker_id,
                    partition_id = %partition_id,
                    first_broken_sequence = report.first_broken_sequence,
                    "ledger partition failed verification"
                );
            }
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    partition_id = %partition_id,
                    error = %error,
                    "verification sweep errored"
                );
            }
        }
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))
}

fn build_services(pool: PgPool, config: &WorkerConfig) -> AppResult<WorkerServices> {
    let ledger_repository = Arc::new(PostgresLedgerRepository::new(pool.clone()));
    let checkpoints = Arc::new(PostgresCheckpointRepository::new(pool.clone()));
    let custody = Arc::new(PostgresCustodyRepository::new(pool.clone()));
    let compliance = Arc::new(PostgresComplianceRepository::new(pool));
    let notifier = Arc::new(TracingComplianceNotifier::new());
    let ledger = LedgerService::new(ledger_repository.clone());

    let locks: Arc<dyn EvidenceLockCoordinator> = match config.redis_url.as_deref() {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL value: {error}"))
            })?;
            Arc::new(RedisEvidenceLockCoordinator::new(client, "custodia:evidence-lock"))
        }
        None => Arc::new(InMemoryEvidenceLockCoordinator::new()),
    };

    // Payload stores are deployment collaborators; the in-memory stand-in
    // covers local runs until the blob-store adapters are wired in.
    let primary_store = Arc::new(InMemoryBlobStore::new("primary"));
    let archive_store = Arc::new(InMemoryBlobStore::new("archive"));

    let retention = RetentionService::new(
        compliance.clone(),
        custody.clone(),
        compliance.clone(),
        compliance.clone(),
        ledger.clone(),
        notifier.clone(),
    );
    let archival = ArchivalService::new(
        compliance.clone(),
        custody,
        compliance.clone(),
        compliance,
        primary_store,
        archive_store,
        locks,
        ledger.clone(),
        notifier.clone(),
        config.worker_id.clone(),
    );
    let integrity = IntegrityService::new(
        ledger_repository.clone(),
        checkpoints,
        ledger,
        notifier,
    );

    Ok(WorkerServices {
        retention,
        archival,
        integrity,
        ledger_repository,
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let redis_url = env::var("REDIS_URL")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let scan_limit = parse_env_usize("WORKER_SCAN_LIMIT", 100)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 30_000)?;

        if scan_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_SCAN_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            redis_url,
            worker_id,
            scan_limit,
            poll_interval_ms,
        })
    }
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
