//! In-memory port implementations mirroring the storage-layer guarantees
//! (open-row uniqueness, conditional closes) that the SQLite adapters
//! enforce with partial unique indexes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use punchclock_core::{ActivityLog, ReportOutbox, SessionRepository, TaskCatalog, UserDirectory};
use punchclock_domain::{
    ActivityLogEntry, EntryType, OutboxStatus, ReportOutboxEntry, Result, Task, TimeSession,
    TimeclockError, UserProfile,
};

#[derive(Default)]
pub struct InMemorySessionRepository {
    rows: Mutex<Vec<TimeSession>>,
}

impl InMemorySessionRepository {
    pub fn seed(&self, session: TimeSession) {
        self.rows.lock().expect("lock").push(session);
    }

    pub fn all(&self) -> Vec<TimeSession> {
        self.rows.lock().expect("lock").clone()
    }

    pub fn get(&self, id: &str) -> Option<TimeSession> {
        self.rows.lock().expect("lock").iter().find(|s| s.id == id).cloned()
    }

    fn is_open_work(s: &TimeSession, user_id: &str, date: NaiveDate) -> bool {
        s.user_id == user_id
            && s.date == date
            && s.entry_type == EntryType::Work
            && s.task_id.is_none()
            && s.is_open()
    }

    fn is_open_break(s: &TimeSession, user_id: &str, date: NaiveDate) -> bool {
        s.user_id == user_id && s.date == date && s.entry_type == EntryType::Break && s.is_open()
    }

    fn is_open_task(s: &TimeSession, user_id: &str) -> bool {
        s.user_id == user_id && s.task_id.is_some() && s.is_open()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert_session(&self, session: &TimeSession) -> Result<()> {
        let mut rows = self.rows.lock().expect("lock");
        if session.task_id.is_some() {
            if rows.iter().any(|s| Self::is_open_task(s, &session.user_id)) {
                return Err(TimeclockError::Database("open task timer already exists".into()));
            }
        } else {
            match session.entry_type {
                EntryType::Work => {
                    if rows.iter().any(|s| Self::is_open_work(s, &session.user_id, session.date)) {
                        return Err(TimeclockError::AlreadyOpen);
                    }
                }
                EntryType::Break => {
                    if rows.iter().any(|s| Self::is_open_break(s, &session.user_id, session.date))
                    {
                        return Err(TimeclockError::AlreadyOnBreak);
                    }
                }
            }
        }
        rows.push(session.clone());
        Ok(())
    }

    async fn find_open_work(&self, user_id: &str, date: NaiveDate) -> Result<Option<TimeSession>> {
        let rows = self.rows.lock().expect("lock");
        Ok(rows.iter().find(|s| Self::is_open_work(s, user_id, date)).cloned())
    }

    async fn last_closed_work_total(&self, user_id: &str, date: NaiveDate) -> Result<f64> {
        let rows = self.rows.lock().expect("lock");
        Ok(rows
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && s.date == date
                    && s.entry_type == EntryType::Work
                    && s.task_id.is_none()
                    && s.clock_out.is_some()
            })
            .max_by_key(|s| s.clock_out)
            .map_or(0.0, |s| s.total_hours))
    }

    async fn close_work(
        &self,
        id: &str,
        clock_out: NaiveDateTime,
        lunch_end: Option<NaiveDateTime>,
        segment_hours: f64,
    ) -> Result<TimeSession> {
        let mut rows = self.rows.lock().expect("lock");
        let row = rows
            .iter_mut()
            .find(|s| s.id == id && s.is_open())
            .ok_or(TimeclockError::NotClockedIn)?;
        row.clock_out = Some(clock_out);
        if row.lunch_end.is_none() {
            row.lunch_end = lunch_end;
        }
        row.total_hours = ((row.total_hours + segment_hours) * 100.0).round() / 100.0;
        row.updated_at = Some(clock_out);
        Ok(row.clone())
    }

    async fn find_open_break(&self, user_id: &str, date: NaiveDate) -> Result<Option<TimeSession>> {
        let rows = self.rows.lock().expect("lock");
        Ok(rows.iter().find(|s| Self::is_open_break(s, user_id, date)).cloned())
    }

    async fn close_break(
        &self,
        id: &str,
        clock_out: NaiveDateTime,
        hours: f64,
    ) -> Result<TimeSession> {
        let mut rows = self.rows.lock().expect("lock");
        let row = rows
            .iter_mut()
            .find(|s| s.id == id && s.is_open())
            .ok_or(TimeclockError::NoBreakOpen)?;
        row.clock_out = Some(clock_out);
        row.total_hours = hours;
        row.updated_at = Some(clock_out);
        Ok(row.clone())
    }

    async fn latest_closed_break_since(
        &self,
        user_id: &str,
        date: NaiveDate,
        since: NaiveDateTime,
    ) -> Result<Option<TimeSession>> {
        let rows = self.rows.lock().expect("lock");
        Ok(rows
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && s.date == date
                    && s.entry_type == EntryType::Break
                    && s.clock_out.is_some()
                    && s.clock_in.is_some_and(|start| start >= since)
            })
            .max_by_key(|s| s.clock_in)
            .cloned())
    }

    async fn set_lunch_start(&self, id: &str, at: NaiveDateTime) -> Result<TimeSession> {
        let mut rows = self.rows.lock().expect("lock");
        let row = rows
            .iter_mut()
            .find(|s| s.id == id && s.is_open() && s.lunch_start.is_none())
            .ok_or(TimeclockError::NotClockedIn)?;
        row.lunch_start = Some(at);
        row.updated_at = Some(at);
        Ok(row.clone())
    }

    async fn set_lunch_end(&self, id: &str, at: NaiveDateTime) -> Result<TimeSession> {
        let mut rows = self.rows.lock().expect("lock");
        let row = rows
            .iter_mut()
            .find(|s| s.id == id && s.is_open() && s.lunch_open())
            .ok_or(TimeclockError::NoLunchOpen)?;
        row.lunch_end = Some(at);
        row.updated_at = Some(at);
        Ok(row.clone())
    }

    async fn find_open_task(&self, user_id: &str) -> Result<Option<TimeSession>> {
        let rows = self.rows.lock().expect("lock");
        Ok(rows.iter().find(|s| Self::is_open_task(s, user_id)).cloned())
    }

    async fn close_open_tasks(&self, user_id: &str, at: NaiveDateTime) -> Result<usize> {
        let mut rows = self.rows.lock().expect("lock");
        let mut closed = 0;
        for row in rows.iter_mut().filter(|s| Self::is_open_task(s, user_id)) {
            row.clock_out = Some(at);
            row.updated_at = Some(at);
            closed += 1;
        }
        Ok(closed)
    }

    async fn close_task(
        &self,
        id: &str,
        clock_out: NaiveDateTime,
        hours: f64,
    ) -> Result<TimeSession> {
        let mut rows = self.rows.lock().expect("lock");
        let row = rows
            .iter_mut()
            .find(|s| s.id == id && s.is_open())
            .ok_or(TimeclockError::NoRunningTask)?;
        row.clock_out = Some(clock_out);
        row.total_hours = hours;
        row.updated_at = Some(clock_out);
        Ok(row.clone())
    }

    async fn finalize_work(&self, id: &str, total_hours: f64) -> Result<()> {
        let mut rows = self.rows.lock().expect("lock");
        let row = rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| TimeclockError::NotFound(format!("session {id}")))?;
        row.total_hours = total_hours;
        row.clock_in = None;
        row.clock_out = None;
        row.lunch_start = None;
        row.lunch_end = None;
        Ok(())
    }

    async fn find_stale_open_work(
        &self,
        user_id: &str,
        before: NaiveDate,
    ) -> Result<Vec<TimeSession>> {
        let rows = self.rows.lock().expect("lock");
        Ok(rows
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && s.date < before
                    && s.entry_type == EntryType::Work
                    && s.task_id.is_none()
                    && s.is_open()
            })
            .cloned()
            .collect())
    }

    async fn find_stale_open_tasks(
        &self,
        user_id: &str,
        before: NaiveDate,
    ) -> Result<Vec<TimeSession>> {
        let rows = self.rows.lock().expect("lock");
        Ok(rows
            .iter()
            .filter(|s| s.user_id == user_id && s.date < before && s.task_id.is_some() && s.is_open())
            .cloned()
            .collect())
    }

    async fn users_with_stale_sessions(&self, before: NaiveDate) -> Result<Vec<String>> {
        let rows = self.rows.lock().expect("lock");
        let mut users: Vec<String> = rows
            .iter()
            .filter(|s| s.date < before && s.is_open())
            .map(|s| s.user_id.clone())
            .collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    async fn sessions_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<TimeSession>> {
        let rows = self.rows.lock().expect("lock");
        let mut day: Vec<TimeSession> = rows
            .iter()
            .filter(|s| s.user_id == user_id && s.date == date && s.task_id.is_none())
            .cloned()
            .collect();
        day.sort_by_key(|s| s.created_at);
        Ok(day)
    }
}

#[derive(Default)]
pub struct InMemoryTaskCatalog {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskCatalog {
    pub fn seed(&self, task: Task) {
        self.tasks.lock().expect("lock").insert(task.id.clone(), task);
    }
}

#[async_trait]
impl TaskCatalog for InMemoryTaskCatalog {
    async fn find_task(&self, task_id: &str) -> Result<Option<Task>> {
        Ok(self.tasks.lock().expect("lock").get(task_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    profiles: Mutex<HashMap<String, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn seed(&self, profile: UserProfile) {
        self.profiles.lock().expect("lock").insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.lock().expect("lock").get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryOutbox {
    entries: Mutex<Vec<ReportOutboxEntry>>,
    pub fail_enqueue: std::sync::atomic::AtomicBool,
}

impl InMemoryOutbox {
    pub fn entries(&self) -> Vec<ReportOutboxEntry> {
        self.entries.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ReportOutbox for InMemoryOutbox {
    async fn enqueue(&self, entry: &ReportOutboxEntry) -> Result<()> {
        if self.fail_enqueue.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(TimeclockError::Database("outbox unavailable".into()));
        }
        self.entries.lock().expect("lock").push(entry.clone());
        Ok(())
    }

    async fn dequeue_batch(
        &self,
        limit: usize,
        now: NaiveDateTime,
    ) -> Result<Vec<ReportOutboxEntry>> {
        let entries = self.entries.lock().expect("lock");
        Ok(entries
            .iter()
            .filter(|e| {
                e.status == OutboxStatus::Pending
                    && e.next_attempt_at.map_or(true, |at| at <= now)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: &str, at: NaiveDateTime) -> Result<()> {
        let mut entries = self.entries.lock().expect("lock");
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.status = OutboxStatus::Sent;
            entry.sent_at = Some(at);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str, now: NaiveDateTime) -> Result<()> {
        let mut entries = self.entries.lock().expect("lock");
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
            entry.status = OutboxStatus::Failed;
            entry.next_attempt_at = Some(now);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryActivityLog {
    entries: Mutex<Vec<ActivityLogEntry>>,
}

impl InMemoryActivityLog {
    pub fn actions(&self) -> Vec<String> {
        self.entries.lock().expect("lock").iter().map(|e| e.action.clone()).collect()
    }
}

#[async_trait]
impl ActivityLog for InMemoryActivityLog {
    async fn record(&self, entry: &ActivityLogEntry) -> Result<()> {
        self.entries.lock().expect("lock").push(entry.clone());
        Ok(())
    }
}
