//! Queue consumer.
//!
//! Each worker is an independent process pulling identifiers from the
//! shared queue: bounded dequeue, processed skip-check, per-item processing
//! through the `ItemProcessor` seam, then an ack back to the queue. Workers
//! stop on their own once the queue stays empty for a configured number of
//! consecutive checks, and drain gracefully on an interrupt signal.
//!
//! Delivery is at-least-once: an id whose worker crashed before acking will
//! be seen again, which is why the skip-check and idempotent acks matter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::catalog::ItemProcessor;
use crate::config::DelayBounds;
use crate::queue::{QueueError, WorkQueue};

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bounded wait for each dequeue attempt.
    pub dequeue_timeout: Duration,
    /// Consecutive empty dequeues before the worker stops.
    pub max_empty_checks: u32,
    /// Delivery attempts per item before it is marked failed.
    pub retry_limit: u32,
    /// Jitter between processed items.
    pub request_delay: DelayBounds,
    /// Longer jitter after a processing error.
    pub error_backoff: DelayBounds,
}

/// Outcome counters for one worker run. Observability only; the
/// coordination store holds the authoritative state.
#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    /// Items processed successfully.
    pub processed: u64,
    /// Items skipped because they were already processed.
    pub skipped: u64,
    /// Failed attempts that were requeued.
    pub requeued: u64,
    /// Items that exhausted their retries on this worker.
    pub exhausted: u64,
}

/// A single queue consumer.
pub struct Worker {
    id: String,
    queue: Arc<WorkQueue>,
    processor: Arc<dyn ItemProcessor>,
    config: WorkerConfig,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Worker {
    /// Creates a worker.
    ///
    /// `id` names the worker in logs only; workers hold no authoritative
    /// state and need no registration.
    pub fn new(
        id: impl Into<String>,
        queue: Arc<WorkQueue>,
        processor: Arc<dyn ItemProcessor>,
        config: WorkerConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            processor,
            config,
            shutdown_rx,
        }
    }

    /// Runs the consume loop until the queue drains or shutdown is
    /// requested.
    ///
    /// # Errors
    ///
    /// Returns `QueueError` on coordination store failures, which are fatal
    /// to the worker: it cannot make progress without the store. Processing
    /// failures are not fatal; they are acked back to the queue.
    pub async fn run(mut self) -> Result<WorkerReport, QueueError> {
        info!(worker_id = %self.id, portal = %self.queue.portal(), "Worker started");

        let mut report = WorkerReport::default();
        let mut empty_streak = 0u32;

        loop {
            if self.shutdown_requested() {
                info!(worker_id = %self.id, "Worker received shutdown signal");
                break;
            }

            let id = match self.queue.dequeue(self.config.dequeue_timeout).await? {
                Some(id) => {
                    empty_streak = 0;
                    id
                }
                None => {
                    empty_streak += 1;
                    debug!(worker_id = %self.id, empty_streak, "Queue empty");
                    if empty_streak >= self.config.max_empty_checks {
                        info!(
                            worker_id = %self.id,
                            checks = empty_streak,
                            "Queue drained, stopping worker"
                        );
                        break;
                    }
                    continue;
                }
            };

            // Redelivery defense: at-least-once delivery means an id can
            // come around again after a crash elsewhere.
            if self.queue.is_processed(&id).await? {
                debug!(worker_id = %self.id, id = %id, "Already processed, skipping");
                report.skipped += 1;
                continue;
            }

            match self.processor.process(&id).await {
                Ok(()) => {
                    self.queue.ack_success(&id).await?;
                    report.processed += 1;
                    debug!(worker_id = %self.id, id = %id, "Item processed");
                    tokio::time::sleep(self.config.request_delay.sample()).await;
                }
                Err(e) => {
                    let requeued = self
                        .queue
                        .ack_failure(&id, self.config.retry_limit, Some(&e.to_string()))
                        .await?;
                    if requeued {
                        report.requeued += 1;
                        warn!(worker_id = %self.id, id = %id, error = %e, "Processing failed, requeued");
                    } else {
                        report.exhausted += 1;
                        error!(worker_id = %self.id, id = %id, error = %e, "Processing failed permanently");
                    }
                    tokio::time::sleep(self.config.error_backoff.sample()).await;
                }
            }

            if (report.processed + report.skipped) % 50 == 0 && report.processed > 0 {
                info!(
                    worker_id = %self.id,
                    processed = report.processed,
                    skipped = report.skipped,
                    requeued = report.requeued,
                    exhausted = report.exhausted,
                    "Worker progress"
                );
            }
        }

        info!(
            worker_id = %self.id,
            processed = report.processed,
            skipped = report.skipped,
            requeued = report.requeued,
            exhausted = report.exhausted,
            "Worker stopped"
        );

        Ok(report)
    }

    /// Non-blocking shutdown check.
    fn shutdown_requested(&mut self) -> bool {
        matches!(
            self.shutdown_rx.try_recv(),
            Ok(()) | Err(broadcast::error::TryRecvError::Closed)
        )
    }

    /// Returns the worker's identity string.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Default worker identity, derived from the process id.
pub fn default_worker_id() -> String {
    format!("worker-{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_report_default() {
        let report = WorkerReport::default();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.requeued, 0);
        assert_eq!(report.exhausted, 0);
    }

    #[test]
    fn test_default_worker_id_is_process_derived() {
        let id = default_worker_id();
        assert!(id.starts_with("worker-"));
        assert_eq!(id, default_worker_id());
    }
}
