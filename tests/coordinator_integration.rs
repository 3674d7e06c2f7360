//! Integration tests for the discovery coordinator against a real
//! coordination store.
//!
//! These tests need a running Redis instance. The catalog client points at
//! an address nothing listens on, so no test issues a real API call.
//! Run with: REDIS_URL=redis://localhost:6379 cargo test --test coordinator_integration -- --ignored

use std::sync::Arc;

use tokio::sync::broadcast;

use portal_harvest::catalog::{CatalogClient, SearchDimensions};
use portal_harvest::config::DelayBounds;
use portal_harvest::coordinator::{Coordinator, CoordinatorConfig};
use portal_harvest::queue::WorkQueue;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

async fn fresh_queue(test_name: &str) -> WorkQueue {
    let portal = format!("harvest-coord-test-{}-{}", test_name, std::process::id());
    let queue = WorkQueue::connect(&redis_url(), &portal)
        .await
        .expect("Redis must be reachable for integration tests");
    queue.clear().await.expect("clear should succeed");
    WorkQueue::connect(&redis_url(), &portal)
        .await
        .expect("reopen should succeed")
}

fn single_combo_dimensions() -> SearchDimensions {
    SearchDimensions::with_overrides(
        Some(vec!["north".to_string()]),
        Some(vec!["house".to_string()]),
        Some(vec!["sale".to_string()]),
    )
}

fn unreachable_client() -> Arc<CatalogClient> {
    // Port 9 (discard) refuses connections immediately on a default host.
    Arc::new(CatalogClient::new("http://127.0.0.1:9", None, 10))
}

#[tokio::test]
#[ignore] // Run with: cargo test --test coordinator_integration -- --ignored
async fn test_shutdown_stops_discovery_before_any_page() {
    let queue = Arc::new(fresh_queue("shutdown").await);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    shutdown_tx.send(()).expect("send shutdown");

    let coordinator = Coordinator::new(
        Arc::clone(&queue),
        unreachable_client(),
        single_combo_dimensions(),
        CoordinatorConfig {
            max_pages: 100,
            request_delay: DelayBounds::new(0, 1),
        },
        shutdown_rx,
    );

    let report = coordinator.run().await.expect("run");

    // The check fires inside the page loop, so the pending interrupt stops
    // the pass before the first API call instead of after the combination.
    assert_eq!(report.combinations, 1);
    assert_eq!(report.pages_fetched, 0);
    assert_eq!(report.failed_combinations, 0);
    assert_eq!(report.discovered, 0);

    queue.clear().await.expect("cleanup");
}

#[tokio::test]
#[ignore]
async fn test_unreachable_api_is_absorbed_per_combination() {
    let queue = Arc::new(fresh_queue("unreachable").await);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let coordinator = Coordinator::new(
        Arc::clone(&queue),
        unreachable_client(),
        single_combo_dimensions(),
        CoordinatorConfig {
            max_pages: 100,
            request_delay: DelayBounds::new(0, 1),
        },
        shutdown_rx,
    );

    let report = coordinator.run().await.expect("run");
    drop(shutdown_tx);

    assert_eq!(report.combinations, 1);
    assert_eq!(report.failed_combinations, 1);
    assert_eq!(report.pages_fetched, 0);
    assert_eq!(report.discovered, 0);

    let stats = queue.stats().await.expect("stats");
    assert_eq!(stats.queue_depth, 0);

    queue.clear().await.expect("cleanup");
}
