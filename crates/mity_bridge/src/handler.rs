//! Entry point invoked by the platform for bridge resources.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::HandlerConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::event::{CompletionSink, LifecycleEvent, LifecycleResponse, Outcome};
use crate::reader::ExportReader;
use crate::store::{ExportStore, READER_RESOURCE_TYPE, WRITER_RESOURCE_TYPE};
use crate::writer::ExportWriter;

/// Result of one invocation.
#[derive(Debug, Clone)]
pub struct HandlerReport {
    /// Response delivered to the completion sink.
    pub response: LifecycleResponse,
    /// Attempts made, retries included.
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HandlerReport {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Dispatches lifecycle events to the reader or writer.
///
/// Every invocation ends with exactly one call to the completion sink,
/// whether the handler succeeded, failed or ran out of time.
pub struct BridgeHandler {
    reader: ExportReader,
    writer: ExportWriter,
    config: HandlerConfig,
}

impl BridgeHandler {
    pub fn new(store: Arc<dyn ExportStore>, config: HandlerConfig) -> Self {
        Self {
            reader: ExportReader::new(store.clone(), config.clone()),
            writer: ExportWriter::new(store, config.clone()),
            config,
        }
    }

    /// Handle one event and report the outcome.
    pub async fn handle(&self, event: &LifecycleEvent, sink: &dyn CompletionSink) -> BridgeResult<HandlerReport> {
        info!(
            "{:?} {} ({}) in {}",
            event.request_type, event.logical_resource_id, event.resource_type, event.stack_id
        );
        let started_at = Utc::now();

        let attempts = AtomicU32::new(0);
        let result = match tokio::time::timeout(self.config.timeout(), self.run_with_retry(event, &attempts)).await {
            Ok(done) => done,
            Err(_) => Err(BridgeError::Timeout(self.config.timeout_secs)),
        };
        let attempts = attempts.load(Ordering::SeqCst);

        let response = match result {
            Ok(outcome) => LifecycleResponse::success(event, outcome),
            Err(error) => {
                warn!("{} failed: {}", event.logical_resource_id, error);
                LifecycleResponse::failure(event, &error)
            }
        };

        sink.complete(response.clone()).await?;

        let report = HandlerReport {
            response,
            attempts,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            "{} finished with {:?} after {} attempt(s) in {}ms",
            event.logical_resource_id,
            report.response.status,
            report.attempts,
            report.duration_ms()
        );
        Ok(report)
    }

    /// Counts attempts in `attempts` so the count survives a timeout.
    async fn run_with_retry(&self, event: &LifecycleEvent, attempts: &AtomicU32) -> BridgeResult<Outcome> {
        loop {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.dispatch(event).await {
                Err(error) if error.is_retryable() && attempt < self.config.max_attempts => {
                    warn!("Attempt {} failed ({}), retrying", attempt, error);
                    tokio::time::sleep(self.config.backoff()).await;
                }
                other => return other,
            }
        }
    }

    async fn dispatch(&self, event: &LifecycleEvent) -> BridgeResult<Outcome> {
        match event.resource_type.as_str() {
            READER_RESOURCE_TYPE => self.reader.on_event(event).await,
            WRITER_RESOURCE_TYPE => self.writer.on_event(event).await,
            other => Err(BridgeError::UnsupportedResourceType(other.to_string())),
        }
    }
}
