//! HTTP client for the external reporting collaborator.
//!
//! The collaborator is a black box to the core: this client only knows how
//! to translate an outbox entry into the matching POST. Requests carry the
//! entry's idempotency key so redeliveries after a crash do not
//! double-report, and the whole client runs under a short timeout so a
//! slow collaborator cannot stall the worker.

use std::time::Duration;

use async_trait::async_trait;
use punchclock_domain::{
    ReportKind, ReportOutboxEntry, ReportRow, ReportingConfig, TaskComment, TaskHours,
    TimeclockError,
};
use reqwest::Client;
use thiserror::Error;

/// Delivery failure for a single outbox entry.
#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("collaborator rejected request with status {0}")]
    Status(u16),
}

/// Interface the outbox worker delivers through.
#[async_trait]
pub trait ReportDispatcher: Send + Sync {
    /// Deliver one outbox entry to the collaborator.
    async fn dispatch(&self, entry: &ReportOutboxEntry) -> Result<(), ReportingError>;
}

/// reqwest-backed dispatcher for the reporting API.
pub struct ReportApiClient {
    http: Client,
    base_url: String,
}

impl ReportApiClient {
    /// Build a client from the reporting configuration.
    pub fn new(config: &ReportingConfig) -> Result<Self, TimeclockError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|err| TimeclockError::Network(format!("http client build failed: {err}")))?;

        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string() })
    }

    async fn post_json<T: serde::Serialize>(
        &self,
        path: &str,
        idempotency_key: &str,
        body: &T,
    ) -> Result<(), ReportingError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("Idempotency-Key", idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(|err| ReportingError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportingError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportDispatcher for ReportApiClient {
    async fn dispatch(&self, entry: &ReportOutboxEntry) -> Result<(), ReportingError> {
        match entry.kind {
            ReportKind::ReportRow => {
                let row: ReportRow = serde_json::from_str(&entry.payload_json)?;
                self.post_json("/api/report-rows", &entry.idempotency_key, &row).await
            }
            ReportKind::TaskComment => {
                let comment: TaskComment = serde_json::from_str(&entry.payload_json)?;
                let path = format!("/api/tasks/{}/comments", comment.external_ref);
                self.post_json(&path, &entry.idempotency_key, &comment).await
            }
            ReportKind::TaskHours => {
                let hours: TaskHours = serde_json::from_str(&entry.payload_json)?;
                let path = format!("/api/tasks/{}/hours", hours.external_ref);
                self.post_json(&path, &entry.idempotency_key, &hours).await
            }
        }
    }
}
