//! The TimeSession ledger row and its read-time projections.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::TimeclockError;

/// Track a ledger row belongs to. Task-timer rows are distinguished by a
/// non-null `task_id` rather than a type tag, for compatibility with the
/// legacy single-row-per-day semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Work,
    Break,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Break => "break",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = TimeclockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(Self::Work),
            "break" => Ok(Self::Break),
            other => Err(TimeclockError::Internal(format!("unknown entry type: {other}"))),
        }
    }
}

/// One row in the ledger: a single open-or-closed interval of work, break,
/// or task-timer activity.
///
/// The owning `date` is assigned at creation and never changes; the
/// Rollover Sweeper closes a stale row late but leaves `date` on its
/// original day. A row is open iff `clock_in` is set and `clock_out` is
/// null; a finalized row keeps only `total_hours`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSession {
    pub id: String,
    pub user_id: String,
    /// Set for task-timer rows, null for work/break rows.
    pub task_id: Option<String>,
    /// Owning calendar day.
    pub date: NaiveDate,
    pub entry_type: EntryType,
    pub clock_in: Option<NaiveDateTime>,
    pub clock_out: Option<NaiveDateTime>,
    /// Lunch span, recorded on the work row it interrupts.
    pub lunch_start: Option<NaiveDateTime>,
    pub lunch_end: Option<NaiveDateTime>,
    /// Accumulated hours; never decreases within a (user, date).
    pub total_hours: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl TimeSession {
    /// New open work row. `carried_hours` is the prior same-day total
    /// carried forward into this cycle.
    pub fn new_work(user_id: &str, date: NaiveDate, clock_in: NaiveDateTime, carried_hours: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            task_id: None,
            date,
            entry_type: EntryType::Work,
            clock_in: Some(clock_in),
            clock_out: None,
            lunch_start: None,
            lunch_end: None,
            total_hours: carried_hours,
            created_at: clock_in,
            updated_at: None,
        }
    }

    /// New open break row.
    pub fn new_break(user_id: &str, date: NaiveDate, clock_in: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            task_id: None,
            date,
            entry_type: EntryType::Break,
            clock_in: Some(clock_in),
            clock_out: None,
            lunch_start: None,
            lunch_end: None,
            total_hours: 0.0,
            created_at: clock_in,
            updated_at: None,
        }
    }

    /// New open task-timer row.
    pub fn new_task(user_id: &str, task_id: &str, date: NaiveDate, clock_in: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            task_id: Some(task_id.to_string()),
            date,
            entry_type: EntryType::Work,
            clock_in: Some(clock_in),
            clock_out: None,
            lunch_start: None,
            lunch_end: None,
            total_hours: 0.0,
            created_at: clock_in,
            updated_at: None,
        }
    }

    /// A session is open iff it has a clock-in and no clock-out.
    pub fn is_open(&self) -> bool {
        self.clock_in.is_some() && self.clock_out.is_none()
    }

    /// True when a lunch period has started but not ended.
    pub fn lunch_open(&self) -> bool {
        self.lunch_start.is_some() && self.lunch_end.is_none()
    }

    pub fn is_task(&self) -> bool {
        self.task_id.is_some()
    }
}

/// Last representable second of a calendar day; the synthetic clock-out
/// used by the Rollover Sweeper.
pub fn day_end(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(23, 59, 59).unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

/// Work row enriched with the legacy mirrored break fields.
///
/// The mirror is computed here, at read time, from the dedicated break
/// rows; it is never stored, so the projection cannot diverge from the
/// break ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSessionView {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub clock_in: Option<NaiveDateTime>,
    pub clock_out: Option<NaiveDateTime>,
    pub break_start: Option<NaiveDateTime>,
    pub break_end: Option<NaiveDateTime>,
    pub lunch_start: Option<NaiveDateTime>,
    pub lunch_end: Option<NaiveDateTime>,
    pub total_hours: f64,
}

/// One user's day: work cycles with mirrored break fields, the raw break
/// rows, and the currently running task timer if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkDayView {
    pub date: NaiveDate,
    pub work: Vec<WorkSessionView>,
    pub breaks: Vec<TimeSession>,
    pub open_task: Option<TimeSession>,
}

impl WorkDayView {
    /// Assemble the projection from the day's ledger rows.
    ///
    /// Each work row mirrors the latest break whose start falls inside
    /// that row's segment (the legacy rows only ever carried one break
    /// pair, so later breaks win).
    pub fn project(
        date: NaiveDate,
        sessions: &[TimeSession],
        open_task: Option<TimeSession>,
    ) -> Self {
        let breaks: Vec<TimeSession> = sessions
            .iter()
            .filter(|s| s.entry_type == EntryType::Break)
            .cloned()
            .collect();

        let work = sessions
            .iter()
            .filter(|s| s.entry_type == EntryType::Work && s.task_id.is_none())
            .map(|w| {
                let mirror = latest_break_in_segment(&breaks, w);
                WorkSessionView {
                    id: w.id.clone(),
                    user_id: w.user_id.clone(),
                    date: w.date,
                    clock_in: w.clock_in,
                    clock_out: w.clock_out,
                    break_start: mirror.and_then(|b| b.clock_in),
                    break_end: mirror.and_then(|b| b.clock_out),
                    lunch_start: w.lunch_start,
                    lunch_end: w.lunch_end,
                    total_hours: w.total_hours,
                }
            })
            .collect();

        Self { date, work, breaks, open_task }
    }
}

fn latest_break_in_segment<'a>(
    breaks: &'a [TimeSession],
    work: &TimeSession,
) -> Option<&'a TimeSession> {
    let segment_start = work.clock_in?;
    breaks
        .iter()
        .filter(|b| {
            b.clock_in.is_some_and(|start| {
                start >= segment_start && work.clock_out.map_or(true, |end| start <= end)
            })
        })
        .max_by_key(|b| b.clock_in)
}
