//! SQLite-backed task catalog.

use std::sync::Arc;

use async_trait::async_trait;
use punchclock_core::TaskCatalog;
use punchclock_domain::{Result, Task, TimeclockError};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;

use super::manager::{map_sql_error, DbManager};

/// SQLite-backed implementation of the `TaskCatalog` port.
pub struct SqliteTaskRepository {
    db: Arc<DbManager>,
}

impl SqliteTaskRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert or replace a catalog entry. Task administration lives
    /// outside the core; this is the hook that outer layer (and the test
    /// suites) use to populate the catalog.
    pub async fn upsert_task(&self, task: &Task) -> Result<()> {
        let db = Arc::clone(&self.db);
        let to_insert = task.clone();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                TASK_UPSERT_SQL,
                params![
                    to_insert.id,
                    to_insert.name,
                    to_insert.external_ref,
                    i64::from(to_insert.active),
                    to_insert.created_at,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(|err| TimeclockError::Internal(format!("task join: {err}")))?
    }
}

#[async_trait]
impl TaskCatalog for SqliteTaskRepository {
    async fn find_task(&self, task_id: &str) -> Result<Option<Task>> {
        let db = Arc::clone(&self.db);
        let task_id = task_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.query_row(TASK_BY_ID_QUERY, params![task_id], map_task_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(|err| TimeclockError::Internal(format!("task join: {err}")))?
    }
}

const TASK_UPSERT_SQL: &str = "INSERT OR REPLACE INTO tasks (id, name, external_ref, active, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5)";

const TASK_BY_ID_QUERY: &str =
    "SELECT id, name, external_ref, active, created_at FROM tasks WHERE id = ?1";

fn map_task_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        external_ref: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
    })
}
