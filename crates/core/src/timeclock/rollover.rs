//! Midnight rollover sweeper.
//!
//! Finds sessions left open past their owning calendar day and
//! force-closes them at that day's end, reusing the hours engine for the
//! truncated segment. The request pipeline runs the per-user sweep before
//! dispatching any timeclock command, so a stale cross-midnight session
//! can never block or corrupt today's operations.

use std::sync::Arc;

use chrono::NaiveDate;
use punchclock_domain::{day_end, Result, TimeSession, TimeclockError};
use tracing::{debug, info};

use super::hours::{compute_segment_hours, round_hours};
use super::ports::SessionRepository;

/// What a sweep touched. Mostly useful for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Stale work rows finalized into pure historical totals.
    pub work_finalized: usize,
    /// Dangling break rows closed at their day end.
    pub breaks_closed: usize,
    /// Stale task-timer rows closed at their day end.
    pub tasks_closed: usize,
}

impl SweepOutcome {
    fn absorb(&mut self, other: Self) {
        self.work_finalized += other.work_finalized;
        self.breaks_closed += other.breaks_closed;
        self.tasks_closed += other.tasks_closed;
    }

    pub fn is_empty(&self) -> bool {
        self.work_finalized == 0 && self.breaks_closed == 0 && self.tasks_closed == 0
    }
}

/// Maintenance pass over one user's stale open sessions.
pub struct RolloverSweeper {
    sessions: Arc<dyn SessionRepository>,
}

impl RolloverSweeper {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }

    /// Close and finalize every session of `user_id` left open on a day
    /// before `as_of`. Idempotent: a second run finds nothing open.
    pub async fn sweep_user(&self, user_id: &str, as_of: NaiveDate) -> Result<SweepOutcome> {
        let mut outcome = SweepOutcome::default();

        for work in self.sessions.find_stale_open_work(user_id, as_of).await? {
            outcome.absorb(self.finalize_stale_work(user_id, &work).await?);
        }

        for task in self.sessions.find_stale_open_tasks(user_id, as_of).await? {
            let end = day_end(task.date);
            let start = stale_clock_in(&task)?;
            let hours = compute_segment_hours(Some(start), Some(end), None, None, None, None);
            self.sessions.close_task(&task.id, end, hours).await?;
            debug!(user_id, session_id = %task.id, hours, "stale task timer closed at day end");
            outcome.tasks_closed += 1;
        }

        if !outcome.is_empty() {
            info!(
                user_id,
                work_finalized = outcome.work_finalized,
                breaks_closed = outcome.breaks_closed,
                tasks_closed = outcome.tasks_closed,
                "rollover sweep finalized stale sessions"
            );
        }
        Ok(outcome)
    }

    /// Batch variant: sweep every user that still has stale open rows.
    pub async fn sweep_all(&self, as_of: NaiveDate) -> Result<SweepOutcome> {
        let mut outcome = SweepOutcome::default();
        for user_id in self.sessions.users_with_stale_sessions(as_of).await? {
            outcome.absorb(self.sweep_user(&user_id, as_of).await?);
        }
        Ok(outcome)
    }

    async fn finalize_stale_work(
        &self,
        user_id: &str,
        work: &TimeSession,
    ) -> Result<SweepOutcome> {
        let mut outcome = SweepOutcome::default();
        let end = day_end(work.date);
        let clock_in = stale_clock_in(work)?;

        // a break left open on that day ends with it
        let break_span = match self.sessions.find_open_break(user_id, work.date).await? {
            Some(brk) => {
                let start = stale_clock_in(&brk)?;
                let hours = compute_segment_hours(Some(start), Some(end), None, None, None, None);
                self.sessions.close_break(&brk.id, end, hours).await?;
                outcome.breaks_closed += 1;
                Some((start, end))
            }
            None => self
                .sessions
                .latest_closed_break_since(user_id, work.date, clock_in)
                .await?
                .and_then(|b| b.clock_in.zip(b.clock_out)),
        };

        let lunch_end = if work.lunch_open() { Some(end) } else { work.lunch_end };
        let segment = compute_segment_hours(
            Some(clock_in),
            Some(end),
            break_span.map(|(s, _)| s),
            break_span.map(|(_, e)| e),
            work.lunch_start,
            lunch_end,
        );

        let total = round_hours(work.total_hours + segment);
        self.sessions.finalize_work(&work.id, total).await?;
        debug!(
            user_id,
            session_id = %work.id,
            segment_hours = segment,
            total_hours = total,
            "stale work session finalized at day end"
        );
        outcome.work_finalized += 1;
        Ok(outcome)
    }
}

fn stale_clock_in(session: &TimeSession) -> Result<chrono::NaiveDateTime> {
    session
        .clock_in
        .ok_or_else(|| TimeclockError::Internal(format!("open session {} has no clock_in", session.id)))
}
