//! Port interfaces for the timeclock core
//!
//! These traits define the boundaries between core business logic
//! and infrastructure implementations.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use punchclock_domain::{
    ActivityLogEntry, ReportOutboxEntry, Result, Task, TimeSession, UserProfile,
};

/// Ledger access for work, break, and task-timer sessions.
///
/// Open-row uniqueness (one open work/break session per user per day, one
/// open task timer per user) is the implementation's responsibility: an
/// insert that loses a race against another open row of the same track
/// must fail with the matching domain error, not silently succeed.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new session row. Fails with `AlreadyOpen` /
    /// `AlreadyOnBreak` when an open row of the same track already exists.
    async fn insert_session(&self, session: &TimeSession) -> Result<()>;

    /// The open work row for (user, date), if any.
    async fn find_open_work(&self, user_id: &str, date: NaiveDate) -> Result<Option<TimeSession>>;

    /// `total_hours` of the most recently closed work row for (user,
    /// date); 0 when the day has no closed cycle yet. Used for
    /// carry-forward on re-clock-in.
    async fn last_closed_work_total(&self, user_id: &str, date: NaiveDate) -> Result<f64>;

    /// Close an open work row: set `clock_out` (and `lunch_end` when
    /// given), add `segment_hours` to the accumulated total, all in one
    /// transaction. Fails with `NotClockedIn` when the row is no longer
    /// open.
    async fn close_work(
        &self,
        id: &str,
        clock_out: NaiveDateTime,
        lunch_end: Option<NaiveDateTime>,
        segment_hours: f64,
    ) -> Result<TimeSession>;

    /// The open break row for (user, date), if any.
    async fn find_open_break(&self, user_id: &str, date: NaiveDate) -> Result<Option<TimeSession>>;

    /// Close an open break row with its computed hours. Fails with
    /// `NoBreakOpen` when the row is no longer open.
    async fn close_break(
        &self,
        id: &str,
        clock_out: NaiveDateTime,
        hours: f64,
    ) -> Result<TimeSession>;

    /// Most recently started break row for (user, date) that is already
    /// closed and started at or after `since`.
    async fn latest_closed_break_since(
        &self,
        user_id: &str,
        date: NaiveDate,
        since: NaiveDateTime,
    ) -> Result<Option<TimeSession>>;

    /// Record lunch start on an open work row that has not taken lunch
    /// yet. Fails with `NotClockedIn` when the row is no longer open.
    async fn set_lunch_start(&self, id: &str, at: NaiveDateTime) -> Result<TimeSession>;

    /// Record lunch end on an open work row with an open lunch.
    async fn set_lunch_end(&self, id: &str, at: NaiveDateTime) -> Result<TimeSession>;

    /// The single open task-timer row for the user, any date.
    async fn find_open_task(&self, user_id: &str) -> Result<Option<TimeSession>>;

    /// Force-close every open task-timer row for the user at `at` with no
    /// hours accumulated (StartTask pre-emption). Returns the number of
    /// rows closed.
    async fn close_open_tasks(&self, user_id: &str, at: NaiveDateTime) -> Result<usize>;

    /// Close an open task-timer row with its computed hours. Fails with
    /// `NoRunningTask` when the row is no longer open.
    async fn close_task(
        &self,
        id: &str,
        clock_out: NaiveDateTime,
        hours: f64,
    ) -> Result<TimeSession>;

    /// Finalize a rolled-over work row: store the new total and null out
    /// every transient marker (`clock_in`, `clock_out`, lunch fields).
    async fn finalize_work(&self, id: &str, total_hours: f64) -> Result<()>;

    /// Open work rows whose owning date precedes `before`.
    async fn find_stale_open_work(
        &self,
        user_id: &str,
        before: NaiveDate,
    ) -> Result<Vec<TimeSession>>;

    /// Open task-timer rows whose owning date precedes `before`.
    async fn find_stale_open_tasks(
        &self,
        user_id: &str,
        before: NaiveDate,
    ) -> Result<Vec<TimeSession>>;

    /// Users that still have any open row dated before `before`; drives
    /// the batch sweep.
    async fn users_with_stale_sessions(&self, before: NaiveDate) -> Result<Vec<String>>;

    /// All work and break rows for (user, date), oldest first.
    async fn sessions_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<TimeSession>>;
}

/// Task catalog consulted before a task timer starts.
#[async_trait]
pub trait TaskCatalog: Send + Sync {
    async fn find_task(&self, task_id: &str) -> Result<Option<Task>>;
}

/// Best-effort user directory for report payload identity.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;
}

/// Outbound reporting queue. The state machine only ever enqueues; the
/// worker on the other side owns delivery, retries, and failure marking.
#[async_trait]
pub trait ReportOutbox: Send + Sync {
    async fn enqueue(&self, entry: &ReportOutboxEntry) -> Result<()>;

    /// Pending entries whose retry window has passed, oldest first.
    async fn dequeue_batch(
        &self,
        limit: usize,
        now: NaiveDateTime,
    ) -> Result<Vec<ReportOutboxEntry>>;

    async fn mark_sent(&self, id: &str, at: NaiveDateTime) -> Result<()>;

    /// Record a delivery failure: bump attempts, store the error, and
    /// either schedule a retry or park the entry as permanently failed.
    async fn mark_failed(&self, id: &str, error: &str, now: NaiveDateTime) -> Result<()>;
}

/// Audit trail for state transitions.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, entry: &ActivityLogEntry) -> Result<()>;
}
