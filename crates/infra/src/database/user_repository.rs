//! SQLite-backed user directory.

use std::sync::Arc;

use async_trait::async_trait;
use punchclock_core::UserDirectory;
use punchclock_domain::{Result, TimeclockError, UserProfile};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;

use super::manager::{map_sql_error, DbManager};

/// SQLite-backed implementation of the `UserDirectory` port.
pub struct SqliteUserProfileRepository {
    db: Arc<DbManager>,
}

impl SqliteUserProfileRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert or replace a directory row; user administration lives
    /// outside the core.
    pub async fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        let db = Arc::clone(&self.db);
        let to_insert = profile.clone();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                PROFILE_UPSERT_SQL,
                params![to_insert.id, to_insert.display_name, to_insert.email],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(|err| TimeclockError::Internal(format!("profile join: {err}")))?
    }
}

#[async_trait]
impl UserDirectory for SqliteUserProfileRepository {
    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.query_row(PROFILE_BY_ID_QUERY, params![user_id], map_profile_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(|err| TimeclockError::Internal(format!("profile join: {err}")))?
    }
}

const PROFILE_UPSERT_SQL: &str =
    "INSERT OR REPLACE INTO user_profiles (id, display_name, email) VALUES (?1, ?2, ?3)";

const PROFILE_BY_ID_QUERY: &str =
    "SELECT id, display_name, email FROM user_profiles WHERE id = ?1";

fn map_profile_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile { id: row.get(0)?, display_name: row.get(1)?, email: row.get(2)? })
}
