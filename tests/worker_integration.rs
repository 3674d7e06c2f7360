//! Integration tests for the worker consume loop against a real
//! coordination store.
//!
//! These tests need a running Redis instance.
//! Run with: REDIS_URL=redis://localhost:6379 cargo test --test worker_integration -- --ignored

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;

use portal_harvest::catalog::{CatalogError, CatalogResult, ItemProcessor};
use portal_harvest::config::DelayBounds;
use portal_harvest::queue::WorkQueue;
use portal_harvest::worker::{Worker, WorkerConfig};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// Opens a queue in a namespace unique to this test run and clears any
/// leftovers from earlier runs.
async fn fresh_queue(test_name: &str) -> WorkQueue {
    let portal = format!("harvest-worker-test-{}-{}", test_name, std::process::id());
    let queue = WorkQueue::connect(&redis_url(), &portal)
        .await
        .expect("Redis must be reachable for integration tests");
    queue.clear().await.expect("clear should succeed");
    WorkQueue::connect(&redis_url(), &portal)
        .await
        .expect("reopen should succeed")
}

fn fast_config(retry_limit: u32) -> WorkerConfig {
    WorkerConfig {
        dequeue_timeout: Duration::from_secs(1),
        max_empty_checks: 2,
        retry_limit,
        request_delay: DelayBounds::new(0, 1),
        error_backoff: DelayBounds::new(0, 1),
    }
}

/// Processor that records every call and fails a scripted set of ids.
struct ScriptedProcessor {
    fail_ids: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProcessor {
    fn new(fail_ids: &[&str]) -> Self {
        Self {
            fail_ids: fail_ids.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls_for(&self, id: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|c| c.as_str() == id)
            .count()
    }
}

#[async_trait]
impl ItemProcessor for ScriptedProcessor {
    async fn process(&self, id: &str) -> CatalogResult<()> {
        self.calls.lock().expect("calls lock").push(id.to_string());
        if self.fail_ids.contains(id) {
            Err(CatalogError::HttpError("scripted outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
#[ignore] // Run with: cargo test --test worker_integration -- --ignored
async fn test_worker_drains_queue_and_acks_each_outcome() {
    let queue = Arc::new(fresh_queue("drain").await);
    let processor = Arc::new(ScriptedProcessor::new(&["b"]));

    // "c" is enqueued but already marked processed, as after a crash
    // between processing and the queue removal elsewhere.
    queue.enqueue("a").await.expect("enqueue");
    queue.enqueue("b").await.expect("enqueue");
    queue.enqueue("c").await.expect("enqueue");
    queue.ack_success("c").await.expect("ack");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = Worker::new(
        "test-worker",
        Arc::clone(&queue),
        Arc::clone(&processor) as Arc<dyn ItemProcessor>,
        fast_config(1),
        shutdown_rx,
    );

    // With retry limit 1, "b" gets requeued once and then exhausted on the
    // second attempt; the run ends after the queue stays empty.
    let report = worker.run().await.expect("worker run");
    drop(shutdown_tx);

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.requeued, 1);
    assert_eq!(report.exhausted, 1);

    assert_eq!(processor.calls_for("a"), 1);
    assert_eq!(processor.calls_for("b"), 2);
    assert_eq!(processor.calls_for("c"), 0);

    assert!(queue.is_processed("a").await.expect("is_processed"));
    assert_eq!(queue.failed_ids().await.expect("failed_ids"), vec!["b"]);
    assert_eq!(queue.retry_count("b").await.expect("retry_count"), 2);

    queue.clear().await.expect("cleanup");
}

#[tokio::test]
#[ignore]
async fn test_worker_stops_after_max_empty_checks() {
    let queue = Arc::new(fresh_queue("empty-exit").await);
    let processor = Arc::new(ScriptedProcessor::new(&[]));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = Worker::new(
        "test-worker",
        Arc::clone(&queue),
        processor as Arc<dyn ItemProcessor>,
        fast_config(3),
        shutdown_rx,
    );

    // Two consecutive 1s empty dequeues, then the worker gives up.
    let start = Instant::now();
    let report = worker.run().await.expect("worker run");
    drop(shutdown_tx);

    assert!(start.elapsed() >= Duration::from_millis(1800));
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.requeued, 0);
    assert_eq!(report.exhausted, 0);

    queue.clear().await.expect("cleanup");
}

#[tokio::test]
#[ignore]
async fn test_worker_honors_shutdown_before_dequeue() {
    let queue = Arc::new(fresh_queue("shutdown").await);
    let processor = Arc::new(ScriptedProcessor::new(&[]));
    queue.enqueue("untouched").await.expect("enqueue");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    shutdown_tx.send(()).expect("send shutdown");

    let worker = Worker::new(
        "test-worker",
        Arc::clone(&queue),
        Arc::clone(&processor) as Arc<dyn ItemProcessor>,
        fast_config(3),
        shutdown_rx,
    );

    let report = worker.run().await.expect("worker run");

    assert_eq!(report.processed, 0);
    assert_eq!(processor.calls_for("untouched"), 0);
    let stats = queue.stats().await.expect("stats");
    assert_eq!(stats.queue_depth, 1);

    queue.clear().await.expect("cleanup");
}
