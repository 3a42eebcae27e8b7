//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for punchclock.
///
/// Domain variants describe expected, recoverable command rejections and
/// carry a stable code for API consumers; the remaining variants wrap
/// infrastructure failures and are never shown verbatim to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TimeclockError {
    #[error("a work session is already open for today")]
    AlreadyOpen,

    #[error("no open work session for today")]
    NotClockedIn,

    #[error("a break is already open")]
    AlreadyOnBreak,

    #[error("no open break to end")]
    NoBreakOpen,

    #[error("a lunch period is currently open")]
    OnLunch,

    #[error("no open lunch period to end")]
    NoLunchOpen,

    #[error("lunch was already taken for this session")]
    LunchAlreadyEnded,

    #[error("unknown task: {0}")]
    InvalidTask(String),

    #[error("no running task timer")]
    NoRunningTask,

    #[error("database error: {0}")]
    Database(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TimeclockError {
    /// Stable machine-readable code surfaced to API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyOpen => "already_open",
            Self::NotClockedIn => "not_clocked_in",
            Self::AlreadyOnBreak => "already_on_break",
            Self::NoBreakOpen => "no_break_open",
            Self::OnLunch => "on_lunch",
            Self::NoLunchOpen => "no_lunch_open",
            Self::LunchAlreadyEnded => "lunch_already_ended",
            Self::InvalidTask(_) => "invalid_task",
            Self::NoRunningTask => "no_running_task",
            Self::Database(_) => "database_error",
            Self::Network(_) => "network_error",
            Self::Config(_) => "config_error",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal_error",
        }
    }

    /// True for the expected, user-recoverable rejections of the state
    /// machine; false for infrastructure failures.
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Network(_) | Self::Config(_) | Self::Internal(_)
        )
    }
}

/// Result type alias for punchclock operations
pub type Result<T> = std::result::Result<T, TimeclockError>;
