//! Audit log record written after every state transition.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One audit entry. Recording is best-effort: a failed write is logged and
/// never fails the transition that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: String,
    pub user_id: String,
    /// Machine-readable action name, e.g. `clock_in`.
    pub action: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_json: Option<String>,
    pub created_at: NaiveDateTime,
}

impl ActivityLogEntry {
    pub fn new(
        user_id: &str,
        action: &str,
        description: String,
        metadata_json: Option<String>,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            action: action.to_string(),
            description,
            metadata_json,
            created_at,
        }
    }
}
