//! SQLite adapters for the core ports.

pub mod activity_log_repository;
pub mod manager;
pub mod outbox_repository;
pub mod session_repository;
pub mod task_repository;
pub mod user_repository;

pub use activity_log_repository::SqliteActivityLogRepository;
pub use manager::{DbConnection, DbManager};
pub use outbox_repository::SqliteReportOutboxRepository;
pub use session_repository::SqliteSessionRepository;
pub use task_repository::SqliteTaskRepository;
pub use user_repository::SqliteUserProfileRepository;
