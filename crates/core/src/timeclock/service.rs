//! Session state machine - core business logic
//!
//! Validates every inbound command against the ledger, delegates segment
//! math to the hours engine, and persists the result through the
//! repository ports. Reporting side effects go through the outbox after
//! the ledger write; their failure never reaches the caller.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use punchclock_domain::{
    ActivityLogEntry, ReportKind, ReportOutboxEntry, ReportRow, Result, Task, TaskComment,
    TaskHours, TimeSession, TimeclockError, UserProfile, WorkDayView,
};
use tracing::{info, warn};

use super::hours::compute_segment_hours;
use super::ports::{ActivityLog, ReportOutbox, SessionRepository, TaskCatalog, UserDirectory};

/// Timeclock state machine service.
pub struct TimeclockService {
    sessions: Arc<dyn SessionRepository>,
    tasks: Arc<dyn TaskCatalog>,
    users: Arc<dyn UserDirectory>,
    outbox: Arc<dyn ReportOutbox>,
    activity_log: Arc<dyn ActivityLog>,
}

impl TimeclockService {
    /// Create a new timeclock service over the given ports.
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        tasks: Arc<dyn TaskCatalog>,
        users: Arc<dyn UserDirectory>,
        outbox: Arc<dyn ReportOutbox>,
        activity_log: Arc<dyn ActivityLog>,
    ) -> Self {
        Self { sessions, tasks, users, outbox, activity_log }
    }

    /// Open a new work cycle for today.
    ///
    /// A prior closed cycle on the same day carries its accumulated total
    /// forward into the new row, so `total_hours` keeps growing
    /// monotonically across shifts. When `task_id` is given the matching
    /// task timer starts alongside the work session (validated up front so
    /// an unknown task rejects the whole command).
    pub async fn clock_in(
        &self,
        user_id: &str,
        now: NaiveDateTime,
        task_id: Option<&str>,
    ) -> Result<TimeSession> {
        let date = now.date();
        if self.sessions.find_open_work(user_id, date).await?.is_some() {
            return Err(TimeclockError::AlreadyOpen);
        }
        if let Some(task_id) = task_id {
            self.tasks
                .find_task(task_id)
                .await?
                .filter(|t| t.active)
                .ok_or_else(|| TimeclockError::InvalidTask(task_id.to_string()))?;
        }

        let carried = self.sessions.last_closed_work_total(user_id, date).await?;
        let session = TimeSession::new_work(user_id, date, now, carried);
        // the open-work uniqueness guard turns a lost race into AlreadyOpen
        self.sessions.insert_session(&session).await?;

        info!(user_id, session_id = %session.id, carried, "work session opened");
        self.log_transition(user_id, "clock_in", format!("clocked in at {now}"), &session.id, now)
            .await;

        if let Some(task_id) = task_id {
            self.start_task(user_id, task_id, now).await?;
        }
        Ok(session)
    }

    /// Close the open work cycle and fold the segment into the day total.
    ///
    /// A break or lunch still open at this instant ends with the shift and
    /// is subtracted from the segment.
    pub async fn clock_out(&self, user_id: &str, now: NaiveDateTime) -> Result<TimeSession> {
        let date = now.date();
        let open = self
            .sessions
            .find_open_work(user_id, date)
            .await?
            .ok_or(TimeclockError::NotClockedIn)?;
        let clock_in = session_clock_in(&open)?;

        let break_span = match self.sessions.find_open_break(user_id, date).await? {
            Some(brk) => {
                let start = session_clock_in(&brk)?;
                let hours = compute_segment_hours(Some(start), Some(now), None, None, None, None);
                self.sessions.close_break(&brk.id, now, hours).await?;
                Some((start, now))
            }
            None => self
                .sessions
                .latest_closed_break_since(user_id, date, clock_in)
                .await?
                .and_then(|b| b.clock_in.zip(b.clock_out)),
        };

        let lunch_close = open.lunch_open().then_some(now);
        let segment = compute_segment_hours(
            Some(clock_in),
            Some(now),
            break_span.map(|(s, _)| s),
            break_span.map(|(_, e)| e),
            open.lunch_start,
            open.lunch_end.or(lunch_close),
        );

        let closed = self.sessions.close_work(&open.id, now, lunch_close, segment).await?;

        info!(
            user_id,
            session_id = %closed.id,
            segment_hours = segment,
            total_hours = closed.total_hours,
            "work session closed"
        );
        self.enqueue_report_row(
            user_id,
            &closed.id,
            "work_segment",
            clock_in,
            now,
            None,
            None,
            date,
        )
        .await;
        self.log_transition(user_id, "clock_out", format!("clocked out at {now}"), &closed.id, now)
            .await;
        Ok(closed)
    }

    /// Open a break inside the current work session.
    pub async fn start_break(&self, user_id: &str, now: NaiveDateTime) -> Result<TimeSession> {
        let date = now.date();
        let open = self
            .sessions
            .find_open_work(user_id, date)
            .await?
            .ok_or(TimeclockError::NotClockedIn)?;
        if open.lunch_open() {
            return Err(TimeclockError::OnLunch);
        }
        if self.sessions.find_open_break(user_id, date).await?.is_some() {
            return Err(TimeclockError::AlreadyOnBreak);
        }

        let brk = TimeSession::new_break(user_id, date, now);
        self.sessions.insert_session(&brk).await?;

        info!(user_id, session_id = %brk.id, "break opened");
        self.log_transition(user_id, "start_break", format!("break started at {now}"), &brk.id, now)
            .await;
        Ok(brk)
    }

    /// Close the open break and report its span.
    pub async fn end_break(&self, user_id: &str, now: NaiveDateTime) -> Result<TimeSession> {
        let date = now.date();
        let brk = self
            .sessions
            .find_open_break(user_id, date)
            .await?
            .ok_or(TimeclockError::NoBreakOpen)?;
        let start = session_clock_in(&brk)?;

        let hours = compute_segment_hours(Some(start), Some(now), None, None, None, None);
        let closed = self.sessions.close_break(&brk.id, now, hours).await?;

        info!(user_id, session_id = %closed.id, hours, "break closed");
        self.enqueue_report_row(user_id, &closed.id, "break", start, now, None, None, date).await;
        self.log_transition(user_id, "end_break", format!("break ended at {now}"), &closed.id, now)
            .await;
        Ok(closed)
    }

    /// Open the lunch period on the current work session. One lunch per
    /// cycle; mutually exclusive with an open break.
    pub async fn start_lunch(&self, user_id: &str, now: NaiveDateTime) -> Result<TimeSession> {
        let date = now.date();
        let open = self
            .sessions
            .find_open_work(user_id, date)
            .await?
            .ok_or(TimeclockError::NotClockedIn)?;
        if self.sessions.find_open_break(user_id, date).await?.is_some() {
            return Err(TimeclockError::AlreadyOnBreak);
        }
        if open.lunch_open() {
            return Err(TimeclockError::OnLunch);
        }
        if open.lunch_end.is_some() {
            return Err(TimeclockError::LunchAlreadyEnded);
        }

        let updated = self.sessions.set_lunch_start(&open.id, now).await?;
        self.log_transition(user_id, "start_lunch", format!("lunch started at {now}"), &updated.id, now)
            .await;
        Ok(updated)
    }

    /// Close the open lunch period. Lunch never mutates `total_hours`
    /// directly; its span is excluded when the enclosing segment closes.
    pub async fn end_lunch(&self, user_id: &str, now: NaiveDateTime) -> Result<TimeSession> {
        let date = now.date();
        let open = self
            .sessions
            .find_open_work(user_id, date)
            .await?
            .ok_or(TimeclockError::NotClockedIn)?;
        if open.lunch_start.is_none() {
            return Err(TimeclockError::NoLunchOpen);
        }
        if open.lunch_end.is_some() {
            return Err(TimeclockError::LunchAlreadyEnded);
        }

        let updated = self.sessions.set_lunch_end(&open.id, now).await?;
        self.log_transition(user_id, "end_lunch", format!("lunch ended at {now}"), &updated.id, now)
            .await;
        Ok(updated)
    }

    /// Start a task timer, pre-empting any other running one.
    ///
    /// The pre-empted session is closed at `now` with no hours accumulated
    /// (only an explicit stop accumulates task hours).
    pub async fn start_task(
        &self,
        user_id: &str,
        task_id: &str,
        now: NaiveDateTime,
    ) -> Result<TimeSession> {
        let task = self
            .tasks
            .find_task(task_id)
            .await?
            .filter(|t| t.active)
            .ok_or_else(|| TimeclockError::InvalidTask(task_id.to_string()))?;

        let preempted = self.sessions.close_open_tasks(user_id, now).await?;
        if preempted > 0 {
            info!(user_id, preempted, "running task timer pre-empted without accumulation");
        }

        let session = TimeSession::new_task(user_id, &task.id, now.date(), now);
        self.sessions.insert_session(&session).await?;

        info!(user_id, task_id = %task.id, session_id = %session.id, "task timer started");
        self.log_transition(
            user_id,
            "start_task",
            format!("task {} started at {now}", task.name),
            &session.id,
            now,
        )
        .await;
        Ok(session)
    }

    /// Stop the running task timer and push the reporting side effects.
    pub async fn stop_task(&self, user_id: &str, now: NaiveDateTime) -> Result<TimeSession> {
        let open =
            self.sessions.find_open_task(user_id).await?.ok_or(TimeclockError::NoRunningTask)?;
        let start = session_clock_in(&open)?;

        let hours = compute_segment_hours(Some(start), Some(now), None, None, None, None);
        let closed = self.sessions.close_task(&open.id, now, hours).await?;

        info!(user_id, session_id = %closed.id, hours, "task timer stopped");
        self.enqueue_task_side_effects(user_id, &closed, start, now, hours).await;
        self.log_transition(user_id, "stop_task", format!("task stopped at {now}"), &closed.id, now)
            .await;
        Ok(closed)
    }

    /// The day's ledger for a user, with mirrored break fields projected
    /// onto each work row.
    pub async fn work_day(&self, user_id: &str, date: NaiveDate) -> Result<WorkDayView> {
        let sessions = self.sessions.sessions_for_day(user_id, date).await?;
        let open_task = self.sessions.find_open_task(user_id).await?;
        Ok(WorkDayView::project(date, &sessions, open_task))
    }

    async fn enqueue_task_side_effects(
        &self,
        user_id: &str,
        closed: &TimeSession,
        start: NaiveDateTime,
        end: NaiveDateTime,
        hours: f64,
    ) {
        let task = match &closed.task_id {
            Some(task_id) => self.lookup_task(task_id).await,
            None => None,
        };
        let external_ref = task.as_ref().and_then(|t| t.external_ref.clone());

        self.enqueue_report_row(
            user_id,
            &closed.id,
            "task_segment",
            start,
            end,
            external_ref.clone(),
            closed.task_id.clone(),
            closed.date,
        )
        .await;

        // aggregate-hours update and comment only make sense for tasks the
        // external system knows about
        let Some(external_ref) = external_ref else {
            return;
        };

        let task_hours =
            TaskHours { external_ref: external_ref.clone(), hours, date: closed.date };
        self.enqueue(user_id, ReportKind::TaskHours, &closed.id, &task_hours, end).await;

        let name = task.map_or_else(|| "task".to_string(), |t| t.name);
        let comment = TaskComment {
            external_ref,
            body: format!("Tracked {hours:.2} h on {name} ({start} - {end})"),
        };
        self.enqueue(user_id, ReportKind::TaskComment, &closed.id, &comment, end).await;
    }

    async fn lookup_task(&self, task_id: &str) -> Option<Task> {
        match self.tasks.find_task(task_id).await {
            Ok(task) => task,
            Err(err) => {
                warn!(task_id, error = %err, "task lookup for side effects failed");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn enqueue_report_row(
        &self,
        user_id: &str,
        session_id: &str,
        event_name: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        related_task_id: Option<String>,
        local_task_id: Option<String>,
        date: NaiveDate,
    ) {
        let profile = match self.users.find_profile(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::unknown(user_id),
            Err(err) => {
                warn!(user_id, error = %err, "user directory lookup failed");
                UserProfile::unknown(user_id)
            }
        };

        let row = ReportRow {
            event_name: event_name.to_string(),
            start,
            end,
            related_task_id,
            user_name: profile.display_name,
            user_email: profile.email,
            local_task_id,
            date,
        };
        self.enqueue(user_id, ReportKind::ReportRow, session_id, &row, end).await;
    }

    /// Serialize and enqueue one outbox entry; fire-and-forget, the ledger
    /// write has already committed.
    async fn enqueue<T: serde::Serialize>(
        &self,
        user_id: &str,
        kind: ReportKind,
        session_id: &str,
        payload: &T,
        now: NaiveDateTime,
    ) {
        let payload_json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(err) => {
                warn!(user_id, %kind, error = %err, "failed to serialize report payload");
                return;
            }
        };

        let entry = ReportOutboxEntry::new(user_id, kind, session_id, payload_json, now);
        if let Err(err) = self.outbox.enqueue(&entry).await {
            warn!(user_id, %kind, error = %err, "failed to enqueue report entry");
        }
    }

    async fn log_transition(
        &self,
        user_id: &str,
        action: &str,
        description: String,
        session_id: &str,
        now: NaiveDateTime,
    ) {
        let metadata = serde_json::json!({ "session_id": session_id }).to_string();
        let entry = ActivityLogEntry::new(user_id, action, description, Some(metadata), now);
        if let Err(err) = self.activity_log.record(&entry).await {
            warn!(user_id, action, error = %err, "failed to record activity log entry");
        }
    }
}

fn session_clock_in(session: &TimeSession) -> Result<NaiveDateTime> {
    session
        .clock_in
        .ok_or_else(|| TimeclockError::Internal(format!("open session {} has no clock_in", session.id)))
}
