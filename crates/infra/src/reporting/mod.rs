//! Outbound reporting: HTTP client for the external project-management
//! API and the outbox worker that drains queued entries to it.

pub mod client;
pub mod worker;

pub use client::{ReportApiClient, ReportDispatcher, ReportingError};
pub use worker::{OutboxWorker, OutboxWorkerConfig};
