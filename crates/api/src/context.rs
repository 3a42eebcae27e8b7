//! Application context - dependency injection container

use std::sync::Arc;

use punchclock_core::{
    ActivityLog, ReportOutbox, RolloverSweeper, SessionRepository, TaskCatalog, TimeclockService,
    UserDirectory,
};
use punchclock_domain::{Config, Result};
use punchclock_infra::{
    DbManager, OutboxWorker, OutboxWorkerConfig, ReportApiClient, ReportDispatcher,
    SqliteActivityLogRepository, SqliteReportOutboxRepository, SqliteSessionRepository,
    SqliteTaskRepository, SqliteUserProfileRepository,
};
use std::time::Duration;

/// Type alias for session repository port trait object
type DynSessionRepository = dyn SessionRepository + 'static;

/// Type alias for task catalog port trait object
type DynTaskCatalog = dyn TaskCatalog + 'static;

/// Type alias for user directory port trait object
type DynUserDirectory = dyn UserDirectory + 'static;

/// Type alias for report outbox port trait object
type DynReportOutbox = dyn ReportOutbox + 'static;

/// Type alias for activity log port trait object
type DynActivityLog = dyn ActivityLog + 'static;

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub timeclock: Arc<TimeclockService>,
    pub sweeper: Arc<RolloverSweeper>,
    pub sessions: Arc<DynSessionRepository>,
    pub tasks: Arc<DynTaskCatalog>,
    pub users: Arc<DynUserDirectory>,
    pub outbox: Arc<DynReportOutbox>,
    pub activity_log: Arc<DynActivityLog>,
}

impl AppContext {
    /// Create a new application context from the given configuration.
    ///
    /// Opens the database, runs migrations, and wires the SQLite adapters
    /// into the core service and sweeper. Fail-fast: any initialization
    /// error aborts startup.
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let db = Arc::new(DbManager::new(&config.database.path, config.database.pool_size)?);
        db.run_migrations()?;

        let sessions: Arc<DynSessionRepository> =
            Arc::new(SqliteSessionRepository::new(Arc::clone(&db)));
        let tasks: Arc<DynTaskCatalog> = Arc::new(SqliteTaskRepository::new(Arc::clone(&db)));
        let users: Arc<DynUserDirectory> =
            Arc::new(SqliteUserProfileRepository::new(Arc::clone(&db)));
        let outbox: Arc<DynReportOutbox> = Arc::new(SqliteReportOutboxRepository::new(
            Arc::clone(&db),
            config.reporting.max_retries,
        ));
        let activity_log: Arc<DynActivityLog> =
            Arc::new(SqliteActivityLogRepository::new(Arc::clone(&db)));

        let timeclock = Arc::new(TimeclockService::new(
            Arc::clone(&sessions),
            Arc::clone(&tasks),
            Arc::clone(&users),
            Arc::clone(&outbox),
            Arc::clone(&activity_log),
        ));
        let sweeper = Arc::new(RolloverSweeper::new(Arc::clone(&sessions)));

        Ok(Arc::new(Self {
            config,
            db,
            timeclock,
            sweeper,
            sessions,
            tasks,
            users,
            outbox,
            activity_log,
        }))
    }

    /// Build the outbox worker for this context. The caller owns its
    /// lifecycle (start on boot, stop on shutdown).
    pub fn build_outbox_worker(&self) -> Result<OutboxWorker> {
        let dispatcher: Arc<dyn ReportDispatcher> =
            Arc::new(ReportApiClient::new(&self.config.reporting)?);
        let worker_config = OutboxWorkerConfig {
            batch_size: self.config.reporting.batch_size,
            poll_interval: Duration::from_secs(self.config.reporting.poll_interval_seconds.max(1)),
            ..OutboxWorkerConfig::default()
        };
        Ok(OutboxWorker::new(Arc::clone(&self.outbox), dispatcher, worker_config))
    }
}
