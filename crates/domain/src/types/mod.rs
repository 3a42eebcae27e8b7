//! Domain types and models

pub mod activity;
pub mod outbox;
pub mod session;
pub mod task;
pub mod user;

// Re-export ledger types for convenience
pub use activity::ActivityLogEntry;
pub use outbox::{OutboxStatus, ReportKind, ReportOutboxEntry, ReportRow, TaskComment, TaskHours};
pub use session::{day_end, EntryType, TimeSession, WorkDayView, WorkSessionView};
pub use task::Task;
pub use user::UserProfile;
