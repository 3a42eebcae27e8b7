//! SQLite-backed audit log.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use punchclock_core::ActivityLog;
use punchclock_domain::{ActivityLogEntry, Result, TimeclockError};
use rusqlite::{params, Row};
use tokio::task;

use super::manager::{map_sql_error, DbManager};

/// SQLite-backed implementation of the `ActivityLog` port.
pub struct SqliteActivityLogRepository {
    db: Arc<DbManager>,
}

impl SqliteActivityLogRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Audit entries for a user on one day, oldest first.
    pub async fn entries_for_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ActivityLogEntry>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(LOG_FOR_DAY_QUERY).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![user_id, date], map_log_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<ActivityLogEntry>>>().map_err(map_sql_error)
        })
        .await
        .map_err(|err| TimeclockError::Internal(format!("activity join: {err}")))?
    }
}

#[async_trait]
impl ActivityLog for SqliteActivityLogRepository {
    async fn record(&self, entry: &ActivityLogEntry) -> Result<()> {
        let db = Arc::clone(&self.db);
        let to_insert = entry.clone();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                LOG_INSERT_SQL,
                params![
                    to_insert.id,
                    to_insert.user_id,
                    to_insert.action,
                    to_insert.description,
                    to_insert.metadata_json,
                    to_insert.created_at,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(|err| TimeclockError::Internal(format!("activity join: {err}")))?
    }
}

const LOG_INSERT_SQL: &str = "INSERT INTO activity_log (
        id, user_id, action, description, metadata_json, created_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const LOG_FOR_DAY_QUERY: &str = "SELECT id, user_id, action, description, metadata_json, created_at
    FROM activity_log
    WHERE user_id = ?1 AND date(created_at) = ?2
    ORDER BY created_at";

fn map_log_row(row: &Row<'_>) -> rusqlite::Result<ActivityLogEntry> {
    Ok(ActivityLogEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        action: row.get(2)?,
        description: row.get(3)?,
        metadata_json: row.get(4)?,
        created_at: row.get(5)?,
    })
}
