//! SQLite-backed implementation of the report outbox port.
//!
//! Entries are enqueued inside the request path (after the ledger write)
//! and drained by the outbox worker. Failure marking keeps retry
//! bookkeeping on the row itself: bounded attempts with a fixed backoff
//! window, then the entry is parked as permanently failed.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use punchclock_core::ReportOutbox as ReportOutboxPort;
use punchclock_domain::constants::{OUTBOX_ERROR_MAX_LEN, OUTBOX_RETRY_BACKOFF_SECS};
use punchclock_domain::{OutboxStatus, ReportKind, ReportOutboxEntry, Result, TimeclockError};
use rusqlite::{params, Row};
use tokio::task;
use tracing::warn;

use super::manager::{map_sql_error, DbConnection, DbManager};

/// SQLite-backed report outbox.
pub struct SqliteReportOutboxRepository {
    db: Arc<DbManager>,
    max_retries: u32,
}

impl SqliteReportOutboxRepository {
    /// Construct a repository backed by the shared manager.
    pub fn new(db: Arc<DbManager>, max_retries: u32) -> Self {
        Self { db, max_retries }
    }

    fn insert_entry(conn: &DbConnection, entry: &ReportOutboxEntry) -> Result<()> {
        conn.execute(
            OUTBOX_INSERT_SQL,
            params![
                entry.id,
                entry.idempotency_key,
                entry.user_id,
                entry.kind.to_string(),
                entry.payload_json,
                entry.status.to_string(),
                entry.attempts,
                entry.last_error,
                entry.next_attempt_at,
                entry.created_at,
                entry.sent_at,
            ],
        )
        .map(|_| ())
        .map_err(map_sql_error)
    }

    fn fetch_pending(
        conn: &DbConnection,
        limit: usize,
        now: NaiveDateTime,
    ) -> Result<Vec<ReportOutboxEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(OUTBOX_DEQUEUE_SQL).map_err(map_sql_error)?;
        let rows = stmt.query_map(params![now, limit], map_outbox_row).map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<Vec<ReportOutboxEntry>>>().map_err(map_sql_error)
    }
}

#[async_trait]
impl ReportOutboxPort for SqliteReportOutboxRepository {
    async fn enqueue(&self, entry: &ReportOutboxEntry) -> Result<()> {
        let db = Arc::clone(&self.db);
        let to_insert = entry.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            Self::insert_entry(&conn, &to_insert)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn dequeue_batch(
        &self,
        limit: usize,
        now: NaiveDateTime,
    ) -> Result<Vec<ReportOutboxEntry>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<ReportOutboxEntry>> {
            let conn = db.get_connection()?;
            Self::fetch_pending(&conn, limit, now)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_sent(&self, id: &str, at: NaiveDateTime) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed =
                conn.execute(OUTBOX_MARK_SENT_SQL, params![id, at]).map_err(map_sql_error)?;
            if changed == 0 {
                return Err(TimeclockError::NotFound(format!("outbox entry {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_failed(&self, id: &str, error: &str, now: NaiveDateTime) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let reason = truncate_reason(error);
        let max_retries = i64::from(self.max_retries);
        let retry_at = now + Duration::seconds(OUTBOX_RETRY_BACKOFF_SECS);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(OUTBOX_MARK_FAILED_SQL, params![id, reason, retry_at, max_retries])
                .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(TimeclockError::NotFound(format!("outbox entry {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

const OUTBOX_INSERT_SQL: &str = "INSERT OR IGNORE INTO report_outbox (
        id, idempotency_key, user_id, kind, payload_json, status, attempts,
        last_error, next_attempt_at, created_at, sent_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const OUTBOX_DEQUEUE_SQL: &str = "SELECT
        id, idempotency_key, user_id, kind, payload_json, status, attempts,
        last_error, next_attempt_at, created_at, sent_at
    FROM report_outbox
    WHERE status = 'pending' AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
    ORDER BY created_at ASC
    LIMIT ?2";

const OUTBOX_MARK_SENT_SQL: &str =
    "UPDATE report_outbox SET status = 'sent', sent_at = ?2 WHERE id = ?1";

const OUTBOX_MARK_FAILED_SQL: &str = "UPDATE report_outbox
    SET attempts = attempts + 1,
        last_error = ?2,
        status = CASE WHEN attempts + 1 >= ?4 THEN 'failed' ELSE 'pending' END,
        next_attempt_at = CASE WHEN attempts + 1 >= ?4 THEN NULL ELSE ?3 END
    WHERE id = ?1";

fn map_outbox_row(row: &Row<'_>) -> rusqlite::Result<ReportOutboxEntry> {
    let id: String = row.get(0)?;
    let kind_raw: String = row.get(3)?;
    let status_raw: String = row.get(5)?;

    let kind = ReportKind::from_str(&kind_raw).unwrap_or_else(|err| {
        warn!(entry_id = %id, raw_kind = %kind_raw, error = %err,
            "invalid report kind returned by sqlite - defaulting to report_row");
        ReportKind::ReportRow
    });
    let status = OutboxStatus::from_str(&status_raw).unwrap_or_else(|err| {
        warn!(entry_id = %id, raw_status = %status_raw, error = %err,
            "invalid outbox status returned by sqlite - defaulting to pending");
        OutboxStatus::Pending
    });

    Ok(ReportOutboxEntry {
        id,
        idempotency_key: row.get(1)?,
        user_id: row.get(2)?,
        kind,
        payload_json: row.get(4)?,
        status,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        next_attempt_at: row.get(8)?,
        created_at: row.get(9)?,
        sent_at: row.get(10)?,
    })
}

fn truncate_reason(reason: &str) -> String {
    if reason.len() <= OUTBOX_ERROR_MAX_LEN {
        return reason.to_string();
    }

    let mut truncated =
        reason.chars().take(OUTBOX_ERROR_MAX_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

fn map_join_error(err: task::JoinError) -> TimeclockError {
    if err.is_cancelled() {
        TimeclockError::Internal("outbox task cancelled".into())
    } else {
        TimeclockError::Internal(format!("outbox task panic: {err}"))
    }
}
