//! SQLite-backed implementation of the `SessionRepository` port.
//!
//! Open-row uniqueness is delegated to the partial unique indexes in the
//! schema: conditional inserts surface a lost race as the matching domain
//! rejection instead of trusting a prior read. Accumulate-and-close runs
//! as a single UPDATE so concurrent closers cannot lose hours, and every
//! write gets one retry when SQLite reports lock contention.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use punchclock_core::SessionRepository as SessionRepositoryPort;
use punchclock_domain::{EntryType, Result, TimeSession, TimeclockError};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;
use tracing::warn;

use super::manager::{map_sql_error, DbConnection, DbManager};
use crate::errors::{is_busy, is_unique_violation};

/// SQLite-backed repository for the TimeSession ledger.
pub struct SqliteSessionRepository {
    db: Arc<DbManager>,
}

impl SqliteSessionRepository {
    /// Create a repository backed by the shared pool.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut DbConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let mut conn = db.get_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl SessionRepositoryPort for SqliteSessionRepository {
    async fn insert_session(&self, session: &TimeSession) -> Result<()> {
        let to_insert = session.clone();
        self.with_conn(move |conn| {
            match retry_once_on_busy(|| insert_session_sql(conn, &to_insert)) {
                Ok(()) => Ok(()),
                Err(err) if is_unique_violation(&err) => Err(open_row_conflict(&to_insert)),
                Err(err) => Err(map_sql_error(err)),
            }
        })
        .await
    }

    async fn find_open_work(&self, user_id: &str, date: NaiveDate) -> Result<Option<TimeSession>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(OPEN_WORK_QUERY, params![user_id, date], map_session_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
    }

    async fn last_closed_work_total(&self, user_id: &str, date: NaiveDate) -> Result<f64> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(LAST_CLOSED_WORK_TOTAL_QUERY, params![user_id, date], |row| {
                row.get::<_, f64>(0)
            })
            .optional()
            .map_err(map_sql_error)
            .map(|total| total.unwrap_or(0.0))
        })
        .await
    }

    async fn close_work(
        &self,
        id: &str,
        clock_out: NaiveDateTime,
        lunch_end: Option<NaiveDateTime>,
        segment_hours: f64,
    ) -> Result<TimeSession> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let updated = retry_once_on_busy(|| {
                close_work_sql(conn, &id, clock_out, lunch_end, segment_hours)
            })
            .map_err(map_sql_error)?;
            updated.ok_or(TimeclockError::NotClockedIn)
        })
        .await
    }

    async fn find_open_break(&self, user_id: &str, date: NaiveDate) -> Result<Option<TimeSession>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(OPEN_BREAK_QUERY, params![user_id, date], map_session_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
    }

    async fn close_break(
        &self,
        id: &str,
        clock_out: NaiveDateTime,
        hours: f64,
    ) -> Result<TimeSession> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let updated =
                retry_once_on_busy(|| close_segment_sql(conn, &id, clock_out, hours))
                    .map_err(map_sql_error)?;
            updated.ok_or(TimeclockError::NoBreakOpen)
        })
        .await
    }

    async fn latest_closed_break_since(
        &self,
        user_id: &str,
        date: NaiveDate,
        since: NaiveDateTime,
    ) -> Result<Option<TimeSession>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(LATEST_CLOSED_BREAK_QUERY, params![user_id, date, since], map_session_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
    }

    async fn set_lunch_start(&self, id: &str, at: NaiveDateTime) -> Result<TimeSession> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = retry_once_on_busy(|| {
                conn.execute(SET_LUNCH_START_SQL, params![id, at])
            })
            .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(lunch_update_rejection(conn, &id, true));
            }
            fetch_session(conn, &id)
        })
        .await
    }

    async fn set_lunch_end(&self, id: &str, at: NaiveDateTime) -> Result<TimeSession> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = retry_once_on_busy(|| {
                conn.execute(SET_LUNCH_END_SQL, params![id, at])
            })
            .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(lunch_update_rejection(conn, &id, false));
            }
            fetch_session(conn, &id)
        })
        .await
    }

    async fn find_open_task(&self, user_id: &str) -> Result<Option<TimeSession>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(OPEN_TASK_QUERY, params![user_id], map_session_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
    }

    async fn close_open_tasks(&self, user_id: &str, at: NaiveDateTime) -> Result<usize> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            retry_once_on_busy(|| conn.execute(CLOSE_OPEN_TASKS_SQL, params![user_id, at]))
                .map_err(map_sql_error)
        })
        .await
    }

    async fn close_task(
        &self,
        id: &str,
        clock_out: NaiveDateTime,
        hours: f64,
    ) -> Result<TimeSession> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let updated =
                retry_once_on_busy(|| close_segment_sql(conn, &id, clock_out, hours))
                    .map_err(map_sql_error)?;
            updated.ok_or(TimeclockError::NoRunningTask)
        })
        .await
    }

    async fn finalize_work(&self, id: &str, total_hours: f64) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed =
                retry_once_on_busy(|| conn.execute(FINALIZE_WORK_SQL, params![id, total_hours]))
                    .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(TimeclockError::NotFound(format!("session {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn find_stale_open_work(
        &self,
        user_id: &str,
        before: NaiveDate,
    ) -> Result<Vec<TimeSession>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| query_sessions(conn, STALE_OPEN_WORK_QUERY, &user_id, before))
            .await
    }

    async fn find_stale_open_tasks(
        &self,
        user_id: &str,
        before: NaiveDate,
    ) -> Result<Vec<TimeSession>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| query_sessions(conn, STALE_OPEN_TASKS_QUERY, &user_id, before))
            .await
    }

    async fn users_with_stale_sessions(&self, before: NaiveDate) -> Result<Vec<String>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(USERS_WITH_STALE_QUERY).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![before], |row| row.get::<_, String>(0))
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<String>>>().map_err(map_sql_error)
        })
        .await
    }

    async fn sessions_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<TimeSession>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| query_sessions(conn, SESSIONS_FOR_DAY_QUERY, &user_id, date))
            .await
    }
}

const SESSION_COLUMNS: &str = "id, user_id, task_id, entry_date, entry_type, clock_in, \
     clock_out, lunch_start, lunch_end, total_hours, created_at, updated_at";

const SESSION_INSERT_SQL: &str = "INSERT INTO time_sessions (
        id, user_id, task_id, entry_date, entry_type, clock_in, clock_out,
        lunch_start, lunch_end, total_hours, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const OPEN_WORK_QUERY: &str = "SELECT id, user_id, task_id, entry_date, entry_type, clock_in, \
     clock_out, lunch_start, lunch_end, total_hours, created_at, updated_at
    FROM time_sessions
    WHERE user_id = ?1 AND entry_date = ?2 AND entry_type = 'work' AND task_id IS NULL
      AND clock_in IS NOT NULL AND clock_out IS NULL";

const LAST_CLOSED_WORK_TOTAL_QUERY: &str = "SELECT total_hours
    FROM time_sessions
    WHERE user_id = ?1 AND entry_date = ?2 AND entry_type = 'work' AND task_id IS NULL
      AND clock_out IS NOT NULL
    ORDER BY clock_out DESC
    LIMIT 1";

const CLOSE_WORK_SQL: &str = "UPDATE time_sessions
    SET clock_out = ?2,
        lunch_end = COALESCE(lunch_end, ?3),
        total_hours = ROUND(total_hours + ?4, 2),
        updated_at = ?2
    WHERE id = ?1 AND clock_in IS NOT NULL AND clock_out IS NULL";

const OPEN_BREAK_QUERY: &str = "SELECT id, user_id, task_id, entry_date, entry_type, clock_in, \
     clock_out, lunch_start, lunch_end, total_hours, created_at, updated_at
    FROM time_sessions
    WHERE user_id = ?1 AND entry_date = ?2 AND entry_type = 'break'
      AND clock_in IS NOT NULL AND clock_out IS NULL";

const CLOSE_SEGMENT_SQL: &str = "UPDATE time_sessions
    SET clock_out = ?2, total_hours = ?3, updated_at = ?2
    WHERE id = ?1 AND clock_in IS NOT NULL AND clock_out IS NULL";

const LATEST_CLOSED_BREAK_QUERY: &str = "SELECT id, user_id, task_id, entry_date, entry_type, \
     clock_in, clock_out, lunch_start, lunch_end, total_hours, created_at, updated_at
    FROM time_sessions
    WHERE user_id = ?1 AND entry_date = ?2 AND entry_type = 'break'
      AND clock_out IS NOT NULL AND clock_in >= ?3
    ORDER BY clock_in DESC
    LIMIT 1";

const SET_LUNCH_START_SQL: &str = "UPDATE time_sessions
    SET lunch_start = ?2, updated_at = ?2
    WHERE id = ?1 AND clock_in IS NOT NULL AND clock_out IS NULL AND lunch_start IS NULL";

const SET_LUNCH_END_SQL: &str = "UPDATE time_sessions
    SET lunch_end = ?2, updated_at = ?2
    WHERE id = ?1 AND clock_in IS NOT NULL AND clock_out IS NULL
      AND lunch_start IS NOT NULL AND lunch_end IS NULL";

const OPEN_TASK_QUERY: &str = "SELECT id, user_id, task_id, entry_date, entry_type, clock_in, \
     clock_out, lunch_start, lunch_end, total_hours, created_at, updated_at
    FROM time_sessions
    WHERE user_id = ?1 AND task_id IS NOT NULL
      AND clock_in IS NOT NULL AND clock_out IS NULL";

const CLOSE_OPEN_TASKS_SQL: &str = "UPDATE time_sessions
    SET clock_out = ?2, updated_at = ?2
    WHERE user_id = ?1 AND task_id IS NOT NULL
      AND clock_in IS NOT NULL AND clock_out IS NULL";

const FINALIZE_WORK_SQL: &str = "UPDATE time_sessions
    SET total_hours = ?2, clock_in = NULL, clock_out = NULL,
        lunch_start = NULL, lunch_end = NULL
    WHERE id = ?1";

const STALE_OPEN_WORK_QUERY: &str = "SELECT id, user_id, task_id, entry_date, entry_type, \
     clock_in, clock_out, lunch_start, lunch_end, total_hours, created_at, updated_at
    FROM time_sessions
    WHERE user_id = ?1 AND entry_date < ?2 AND entry_type = 'work' AND task_id IS NULL
      AND clock_in IS NOT NULL AND clock_out IS NULL
    ORDER BY entry_date";

const STALE_OPEN_TASKS_QUERY: &str = "SELECT id, user_id, task_id, entry_date, entry_type, \
     clock_in, clock_out, lunch_start, lunch_end, total_hours, created_at, updated_at
    FROM time_sessions
    WHERE user_id = ?1 AND entry_date < ?2 AND task_id IS NOT NULL
      AND clock_in IS NOT NULL AND clock_out IS NULL
    ORDER BY entry_date";

const USERS_WITH_STALE_QUERY: &str = "SELECT DISTINCT user_id
    FROM time_sessions
    WHERE entry_date < ?1 AND clock_in IS NOT NULL AND clock_out IS NULL
    ORDER BY user_id";

const SESSIONS_FOR_DAY_QUERY: &str = "SELECT id, user_id, task_id, entry_date, entry_type, \
     clock_in, clock_out, lunch_start, lunch_end, total_hours, created_at, updated_at
    FROM time_sessions
    WHERE user_id = ?1 AND entry_date = ?2 AND task_id IS NULL
    ORDER BY created_at";

fn insert_session_sql(conn: &DbConnection, session: &TimeSession) -> rusqlite::Result<()> {
    conn.execute(
        SESSION_INSERT_SQL,
        params![
            session.id,
            session.user_id,
            session.task_id,
            session.date,
            session.entry_type.as_str(),
            session.clock_in,
            session.clock_out,
            session.lunch_start,
            session.lunch_end,
            session.total_hours,
            session.created_at,
            session.updated_at,
        ],
    )
    .map(|_| ())
}

fn close_work_sql(
    conn: &mut DbConnection,
    id: &str,
    clock_out: NaiveDateTime,
    lunch_end: Option<NaiveDateTime>,
    segment_hours: f64,
) -> rusqlite::Result<Option<TimeSession>> {
    let tx = conn.transaction()?;
    let changed = tx.execute(CLOSE_WORK_SQL, params![id, clock_out, lunch_end, segment_hours])?;
    let updated = if changed == 0 {
        None
    } else {
        tx.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM time_sessions WHERE id = ?1"),
            params![id],
            map_session_row,
        )
        .optional()?
    };
    tx.commit()?;
    Ok(updated)
}

fn close_segment_sql(
    conn: &mut DbConnection,
    id: &str,
    clock_out: NaiveDateTime,
    hours: f64,
) -> rusqlite::Result<Option<TimeSession>> {
    let tx = conn.transaction()?;
    let changed = tx.execute(CLOSE_SEGMENT_SQL, params![id, clock_out, hours])?;
    let updated = if changed == 0 {
        None
    } else {
        tx.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM time_sessions WHERE id = ?1"),
            params![id],
            map_session_row,
        )
        .optional()?
    };
    tx.commit()?;
    Ok(updated)
}

fn fetch_session(conn: &DbConnection, id: &str) -> Result<TimeSession> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM time_sessions WHERE id = ?1"),
        params![id],
        map_session_row,
    )
    .map_err(map_sql_error)
}

/// Explain a zero-row lunch update: the row may have closed underneath us
/// or the lunch fields may already be set.
fn lunch_update_rejection(conn: &DbConnection, id: &str, starting: bool) -> TimeclockError {
    match fetch_session(conn, id) {
        Ok(row) if !row.is_open() => TimeclockError::NotClockedIn,
        Ok(row) => {
            if starting {
                if row.lunch_open() {
                    TimeclockError::OnLunch
                } else {
                    TimeclockError::LunchAlreadyEnded
                }
            } else if row.lunch_start.is_none() {
                TimeclockError::NoLunchOpen
            } else {
                TimeclockError::LunchAlreadyEnded
            }
        }
        Err(err) => err,
    }
}

fn query_sessions<K>(
    conn: &DbConnection,
    sql: &str,
    user_id: &str,
    key: K,
) -> Result<Vec<TimeSession>>
where
    K: rusqlite::ToSql,
{
    let mut stmt = conn.prepare(sql).map_err(map_sql_error)?;
    let rows = stmt.query_map(params![user_id, key], map_session_row).map_err(map_sql_error)?;
    rows.collect::<rusqlite::Result<Vec<TimeSession>>>().map_err(map_sql_error)
}

fn map_session_row(row: &Row<'_>) -> rusqlite::Result<TimeSession> {
    let id: String = row.get(0)?;
    let entry_type_raw: String = row.get(4)?;
    let entry_type = EntryType::from_str(&entry_type_raw).unwrap_or_else(|err| {
        warn!(
            session_id = %id,
            raw_entry_type = %entry_type_raw,
            error = %err,
            "invalid entry type returned by sqlite - defaulting to work"
        );
        EntryType::Work
    });

    Ok(TimeSession {
        id,
        user_id: row.get(1)?,
        task_id: row.get(2)?,
        date: row.get(3)?,
        entry_type,
        clock_in: row.get(5)?,
        clock_out: row.get(6)?,
        lunch_start: row.get(7)?,
        lunch_end: row.get(8)?,
        total_hours: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Which domain rejection a unique-index conflict on insert means.
fn open_row_conflict(session: &TimeSession) -> TimeclockError {
    if session.task_id.is_some() {
        // StartTask pre-empts before inserting, so this only fires when two
        // starts race; surfaced as a transient infrastructure error.
        TimeclockError::Database("open task timer already exists".into())
    } else {
        match session.entry_type {
            EntryType::Work => TimeclockError::AlreadyOpen,
            EntryType::Break => TimeclockError::AlreadyOnBreak,
        }
    }
}

fn retry_once_on_busy<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> rusqlite::Result<T> {
    match op() {
        Err(err) if is_busy(&err) => op(),
        other => other,
    }
}

fn map_join_error(err: task::JoinError) -> TimeclockError {
    if err.is_cancelled() {
        TimeclockError::Internal("database task cancelled".into())
    } else {
        TimeclockError::Internal(format!("database task panic: {err}"))
    }
}
