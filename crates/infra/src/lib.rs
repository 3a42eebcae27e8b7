//! # Punchclock Infra
//!
//! Infrastructure adapters for the punchclock core:
//! - SQLite implementations of every core port (r2d2-pooled rusqlite)
//! - The outbound report client and outbox worker
//! - Configuration loading
//! - Conversions from infrastructure errors into the domain error

pub mod config;
pub mod database;
pub mod errors;
pub mod reporting;

pub use database::{
    DbManager, SqliteActivityLogRepository, SqliteReportOutboxRepository, SqliteSessionRepository,
    SqliteTaskRepository, SqliteUserProfileRepository,
};
pub use errors::InfraError;
pub use reporting::{
    OutboxWorker, OutboxWorkerConfig, ReportApiClient, ReportDispatcher, ReportingError,
};
