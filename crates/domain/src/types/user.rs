//! Minimal user directory row.

use serde::{Deserialize, Serialize};

/// Display identity attached to outbound report rows. The directory is
/// best-effort; callers fall back to placeholders when a profile is
/// missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

impl UserProfile {
    /// Placeholder profile for users the directory does not know.
    pub fn unknown(user_id: &str) -> Self {
        Self {
            id: user_id.to_string(),
            display_name: user_id.to_string(),
            email: String::new(),
        }
    }
}
