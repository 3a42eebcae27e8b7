//! Outbound reporting queue types.
//!
//! The state machine never talks to the external reporting API directly;
//! it enqueues one of these entries after its own transaction commits and
//! the outbox worker owns delivery and retries.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::TimeclockError;

/// Delivery state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for OutboxStatus {
    type Err = TimeclockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(TimeclockError::Internal(format!("unknown outbox status: {other}"))),
        }
    }
}

/// What kind of side effect an entry carries; the worker dispatches on
/// this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// A reporting row for a closed work/break/task segment.
    ReportRow,
    /// A comment posted on the external task.
    TaskComment,
    /// Aggregate tracked-hours update on the external task.
    TaskHours,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReportRow => "report_row",
            Self::TaskComment => "task_comment",
            Self::TaskHours => "task_hours",
        };
        f.write_str(s)
    }
}

impl FromStr for ReportKind {
    type Err = TimeclockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "report_row" => Ok(Self::ReportRow),
            "task_comment" => Ok(Self::TaskComment),
            "task_hours" => Ok(Self::TaskHours),
            other => Err(TimeclockError::Internal(format!("unknown report kind: {other}"))),
        }
    }
}

/// Reporting-row payload pushed to the external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub event_name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// External system's task identifier, when the row relates to a task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_task_id: Option<String>,
    pub user_name: String,
    pub user_email: String,
    /// Our own task id, for traceability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_task_id: Option<String>,
    pub date: NaiveDate,
}

/// Comment payload for a stopped task timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskComment {
    pub external_ref: String,
    pub body: String,
}

/// Aggregate-hours payload for a stopped task timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHours {
    pub external_ref: String,
    pub hours: f64,
    pub date: NaiveDate,
}

/// One queued outbound notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutboxEntry {
    pub id: String,
    /// Dedupe key the collaborator can use; stable across redeliveries.
    pub idempotency_key: String,
    pub user_id: String,
    pub kind: ReportKind,
    pub payload_json: String,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Entries are not dequeued before this instant (retry backoff).
    pub next_attempt_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
}

impl ReportOutboxEntry {
    /// New pending entry. The idempotency key is derived from the session
    /// and kind so a redelivered command does not double-report.
    pub fn new(
        user_id: &str,
        kind: ReportKind,
        session_id: &str,
        payload_json: String,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            idempotency_key: format!("{session_id}:{kind}"),
            user_id: user_id.to_string(),
            kind,
            payload_json,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            created_at,
            sent_at: None,
        }
    }
}
