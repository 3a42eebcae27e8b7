//! Outbox worker for periodic batch processing and forwarding.
//!
//! Polls the report outbox for pending entries, forwards each one to the
//! external reporting API, and updates local outbox status based on the
//! outcome. Join handles are tracked, cancellation is explicit, and batch
//! processing runs under a timeout so one slow collaborator call cannot
//! wedge the loop. Delivery failures only ever touch outbox bookkeeping;
//! nothing propagates back into the command path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use punchclock_core::ReportOutbox;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::client::ReportDispatcher;

/// Configuration for the outbox worker.
#[derive(Debug, Clone)]
pub struct OutboxWorkerConfig {
    /// Maximum number of entries to process per batch
    pub batch_size: usize,
    /// Interval between polling attempts
    pub poll_interval: Duration,
    /// Timeout for processing a single batch
    pub processing_timeout: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for OutboxWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_secs(30),
            processing_timeout: Duration::from_secs(120),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Outbox worker with explicit lifecycle management.
pub struct OutboxWorker {
    outbox: Arc<dyn ReportOutbox>,
    dispatcher: Arc<dyn ReportDispatcher>,
    config: OutboxWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl OutboxWorker {
    /// Create a new outbox worker with the given configuration.
    pub fn new(
        outbox: Arc<dyn ReportOutbox>,
        dispatcher: Arc<dyn ReportDispatcher>,
        config: OutboxWorkerConfig,
    ) -> Self {
        Self {
            outbox,
            dispatcher,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the worker, spawning the background processing task.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Worker already running".to_string());
        }

        info!("Starting outbox worker");

        self.cancellation = CancellationToken::new();

        let outbox = Arc::clone(&self.outbox);
        let dispatcher = Arc::clone(&self.dispatcher);
        let poll_interval = self.config.poll_interval;
        let batch_size = self.config.batch_size;
        let processing_timeout = self.config.processing_timeout;
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::process_loop(outbox, dispatcher, poll_interval, batch_size, processing_timeout, cancel)
                .await;
        });

        self.task_handle = Some(handle);
        info!("Outbox worker started");

        Ok(())
    }

    /// Stop the worker and wait for the processing task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), String> {
        if !self.is_running() {
            return Err("Worker not running".to_string());
        }

        info!("Stopping outbox worker");

        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            let join_timeout = self.config.join_timeout;
            match tokio::time::timeout(join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Worker task panicked: {}", e);
                    return Err("Worker task panicked".to_string());
                }
                Err(_) => {
                    warn!("Worker task did not complete within timeout");
                    return Err("Worker task timeout".to_string());
                }
            }
        }

        info!("Outbox worker stopped");
        self.cancellation = CancellationToken::new();

        Ok(())
    }

    /// Returns true when a worker instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Background processing loop.
    async fn process_loop(
        outbox: Arc<dyn ReportOutbox>,
        dispatcher: Arc<dyn ReportDispatcher>,
        poll_interval: Duration,
        batch_size: usize,
        processing_timeout: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Outbox worker process loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {
                    match tokio::time::timeout(
                        processing_timeout,
                        Self::process_batch(&outbox, &dispatcher, batch_size),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!(error = %e, "Batch processing failed");
                        }
                        Err(_) => {
                            warn!(
                                timeout_secs = processing_timeout.as_secs(),
                                "Batch processing timed out"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Process a single batch of outbox entries.
    async fn process_batch(
        outbox: &Arc<dyn ReportOutbox>,
        dispatcher: &Arc<dyn ReportDispatcher>,
        batch_size: usize,
    ) -> Result<(), String> {
        let now = Local::now().naive_local();
        let entries = outbox
            .dequeue_batch(batch_size, now)
            .await
            .map_err(|e| format!("Failed to dequeue batch: {e}"))?;

        if entries.is_empty() {
            debug!("No pending entries to process");
            return Ok(());
        }

        info!(count = entries.len(), "Processing outbox batch");

        let mut fatal_errors: Vec<String> = Vec::new();
        let mut forwarded = 0_u32;
        let mut failures = 0_u32;

        for entry in entries {
            match dispatcher.dispatch(&entry).await {
                Ok(()) => {
                    debug!(entry_id = %entry.id, kind = %entry.kind, "Forwarded outbox entry");
                    if let Err(err) = outbox.mark_sent(&entry.id, now).await {
                        let msg = err.to_string();
                        warn!(entry_id = %entry.id, error = %msg, "mark_sent failed");
                        fatal_errors.push(format!("mark_sent error for {}: {}", entry.id, msg));
                    } else {
                        forwarded = forwarded.saturating_add(1);
                    }
                }
                Err(err) => {
                    warn!(
                        entry_id = %entry.id,
                        kind = %entry.kind,
                        error = %err,
                        "Forwarding outbox entry failed"
                    );
                    if let Err(mark_err) =
                        outbox.mark_failed(&entry.id, &err.to_string(), now).await
                    {
                        let msg = mark_err.to_string();
                        warn!(entry_id = %entry.id, error = %msg, "mark_failed failed");
                        fatal_errors.push(format!("mark_failed error for {}: {}", entry.id, msg));
                    }
                    failures = failures.saturating_add(1);
                }
            }
        }

        debug!(forwarded, failures, "Outbox batch completed");

        if !fatal_errors.is_empty() {
            return Err(fatal_errors.join("; "));
        }

        Ok(())
    }
}

impl Drop for OutboxWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("OutboxWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use punchclock_domain::{
        OutboxStatus, ReportKind, ReportOutboxEntry, Result as DomainResult, TimeclockError,
    };
    use tokio::sync::Mutex as TokioMutex;

    use super::super::client::ReportingError;
    use super::*;

    type EntryStore = Arc<TokioMutex<Vec<ReportOutboxEntry>>>;
    type SentStore = Arc<TokioMutex<Vec<String>>>;
    type FailedStore = Arc<TokioMutex<Vec<(String, String)>>>;
    type ResponseQueue = TokioMutex<Vec<Result<(), ReportingError>>>;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|d| d.and_hms_opt(17, 0, 0))
            .expect("valid timestamp")
    }

    fn sample_entry(id: &str) -> ReportOutboxEntry {
        ReportOutboxEntry {
            id: id.to_string(),
            idempotency_key: format!("idem-{id}"),
            user_id: "user-123".to_string(),
            payload_json: "{}".to_string(),
            kind: ReportKind::ReportRow,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            created_at: now(),
            sent_at: None,
        }
    }

    struct MockOutboxRepo {
        entries: EntryStore,
        sent: SentStore,
        failed: FailedStore,
        fail_mark_sent: bool,
    }

    impl MockOutboxRepo {
        fn new(entries: Vec<ReportOutboxEntry>) -> Self {
            Self {
                entries: Arc::new(TokioMutex::new(entries)),
                sent: Arc::new(TokioMutex::new(Vec::new())),
                failed: Arc::new(TokioMutex::new(Vec::new())),
                fail_mark_sent: false,
            }
        }

        fn with_fail_mark_sent(mut self) -> Self {
            self.fail_mark_sent = true;
            self
        }

        async fn sent_entries(&self) -> Vec<String> {
            self.sent.lock().await.clone()
        }

        async fn failed_entries(&self) -> Vec<(String, String)> {
            self.failed.lock().await.clone()
        }
    }

    #[async_trait]
    impl ReportOutbox for MockOutboxRepo {
        async fn enqueue(&self, entry: &ReportOutboxEntry) -> DomainResult<()> {
            self.entries.lock().await.push(entry.clone());
            Ok(())
        }

        async fn dequeue_batch(
            &self,
            limit: usize,
            _now: NaiveDateTime,
        ) -> DomainResult<Vec<ReportOutboxEntry>> {
            let mut entries = self.entries.lock().await;
            let batch_len = limit.min(entries.len());
            let batch: Vec<_> = entries.drain(..batch_len).collect();
            Ok(batch)
        }

        async fn mark_sent(&self, id: &str, _at: NaiveDateTime) -> DomainResult<()> {
            if self.fail_mark_sent {
                return Err(TimeclockError::Internal("mark_sent failure".into()));
            }
            self.sent.lock().await.push(id.to_string());
            Ok(())
        }

        async fn mark_failed(
            &self,
            id: &str,
            error: &str,
            _now: NaiveDateTime,
        ) -> DomainResult<()> {
            self.failed.lock().await.push((id.to_string(), error.to_string()));
            Ok(())
        }
    }

    struct MockDispatcher {
        responses: ResponseQueue,
        calls: Arc<TokioMutex<Vec<String>>>,
    }

    impl MockDispatcher {
        fn new(responses: Vec<Result<(), ReportingError>>) -> Self {
            Self {
                responses: TokioMutex::new(responses),
                calls: Arc::new(TokioMutex::new(Vec::new())),
            }
        }

        async fn call_count(&self) -> usize {
            self.calls.lock().await.len()
        }
    }

    #[async_trait]
    impl ReportDispatcher for MockDispatcher {
        async fn dispatch(&self, entry: &ReportOutboxEntry) -> Result<(), ReportingError> {
            self.calls.lock().await.push(entry.id.clone());
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                Ok(())
            } else {
                responses.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn process_batch_marks_sent_on_success() {
        let repo = Arc::new(MockOutboxRepo::new(vec![sample_entry("entry-1")]));
        let repo_trait: Arc<dyn ReportOutbox> = repo.clone();
        let dispatcher = Arc::new(MockDispatcher::new(vec![Ok(())]));
        let dispatcher_trait: Arc<dyn ReportDispatcher> = dispatcher.clone();

        let result = OutboxWorker::process_batch(&repo_trait, &dispatcher_trait, 10).await;
        assert!(result.is_ok());

        let sent = repo.sent_entries().await;
        assert_eq!(sent, vec!["entry-1".to_string()]);
        assert_eq!(dispatcher.call_count().await, 1);
    }

    #[tokio::test]
    async fn process_batch_marks_failed_on_dispatch_error() {
        let repo = Arc::new(MockOutboxRepo::new(vec![sample_entry("entry-down")]));
        let repo_trait: Arc<dyn ReportOutbox> = repo.clone();
        let dispatcher =
            Arc::new(MockDispatcher::new(vec![Err(ReportingError::Status(503))]));
        let dispatcher_trait: Arc<dyn ReportDispatcher> = dispatcher.clone();

        let result = OutboxWorker::process_batch(&repo_trait, &dispatcher_trait, 5).await;
        assert!(result.is_ok(), "delivery failures are bookkeeping, not batch errors");

        let failed = repo.failed_entries().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "entry-down");
        assert!(failed[0].1.contains("503"));
    }

    #[tokio::test]
    async fn process_batch_continues_after_a_failure() {
        let repo = Arc::new(MockOutboxRepo::new(vec![
            sample_entry("entry-1"),
            sample_entry("entry-2"),
        ]));
        let repo_trait: Arc<dyn ReportOutbox> = repo.clone();
        let dispatcher = Arc::new(MockDispatcher::new(vec![
            Err(ReportingError::Transport("connection refused".into())),
            Ok(()),
        ]));
        let dispatcher_trait: Arc<dyn ReportDispatcher> = dispatcher.clone();

        let result = OutboxWorker::process_batch(&repo_trait, &dispatcher_trait, 5).await;
        assert!(result.is_ok());

        assert_eq!(repo.failed_entries().await.len(), 1);
        assert_eq!(repo.sent_entries().await, vec!["entry-2".to_string()]);
    }

    #[tokio::test]
    async fn process_batch_propagates_mark_sent_failures() {
        let repo = Arc::new(
            MockOutboxRepo::new(vec![sample_entry("entry-fail")]).with_fail_mark_sent(),
        );
        let repo_trait: Arc<dyn ReportOutbox> = repo.clone();
        let dispatcher = Arc::new(MockDispatcher::new(vec![Ok(())]));
        let dispatcher_trait: Arc<dyn ReportDispatcher> = dispatcher.clone();

        let result = OutboxWorker::process_batch(&repo_trait, &dispatcher_trait, 5).await;
        assert!(result.is_err());
        assert!(repo.sent_entries().await.is_empty());
    }

    #[tokio::test]
    async fn worker_lifecycle_start_and_stop() {
        let repo: Arc<dyn ReportOutbox> = Arc::new(MockOutboxRepo::new(Vec::new()));
        let dispatcher: Arc<dyn ReportDispatcher> = Arc::new(MockDispatcher::new(Vec::new()));
        let mut worker = OutboxWorker::new(
            repo,
            dispatcher,
            OutboxWorkerConfig {
                poll_interval: Duration::from_millis(10),
                ..OutboxWorkerConfig::default()
            },
        );

        assert!(!worker.is_running());
        worker.start().expect("starts");
        assert!(worker.is_running());
        assert!(worker.start().is_err(), "double start is rejected");

        worker.stop().await.expect("stops");
        assert!(!worker.is_running());
        assert!(worker.stop().await.is_err(), "double stop is rejected");
    }
}
