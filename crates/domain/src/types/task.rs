//! Local task catalog entry consulted by the task timer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A task users can track time against. `external_ref` is the identifier
/// the external project-management system knows this task by; reporting
/// side effects are skipped when it is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}
