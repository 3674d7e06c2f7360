//! Discovery coordinator.
//!
//! Enumerates the full search space (region x category x deal type), pages
//! through the remote search API for each combination, and enqueues every
//! identifier seen. Discovery is best-effort: a combination that fails is
//! logged and skipped, never aborts the pass.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, SearchDimensions};
use crate::config::DelayBounds;
use crate::queue::{QueueError, WorkQueue};

/// Configuration for a discovery pass.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum pages fetched per search combination.
    pub max_pages: u32,
    /// Jitter between API calls.
    pub request_delay: DelayBounds,
}

/// Outcome of one full discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Search combinations attempted.
    pub combinations: usize,
    /// Combinations that failed and were skipped.
    pub failed_combinations: usize,
    /// Total pages fetched across all combinations.
    pub pages_fetched: u64,
    /// Identifiers newly discovered (after dedup).
    pub discovered: usize,
}

/// Runs discovery passes against the catalog search API.
pub struct Coordinator {
    queue: Arc<WorkQueue>,
    client: Arc<CatalogClient>,
    dimensions: SearchDimensions,
    config: CoordinatorConfig,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Coordinator {
    /// Creates a coordinator.
    pub fn new(
        queue: Arc<WorkQueue>,
        client: Arc<CatalogClient>,
        dimensions: SearchDimensions,
        config: CoordinatorConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            queue,
            client,
            dimensions,
            config,
            shutdown_rx,
        }
    }

    /// Runs one full discovery pass and returns a best-effort report.
    ///
    /// # Errors
    ///
    /// Returns `QueueError` only on coordination store failures; remote API
    /// failures are absorbed per combination.
    pub async fn run(mut self) -> Result<DiscoveryReport, QueueError> {
        let combos = self.dimensions.combinations();
        let mut report = DiscoveryReport::default();

        info!(
            portal = %self.queue.portal(),
            combinations = combos.len(),
            signed = self.client.can_sign(),
            "Starting discovery pass"
        );

        'combos: for combo in &combos {
            report.combinations += 1;

            for page in 1..=self.config.max_pages {
                // Checked per page, not per combination: an interrupt must
                // not wait out a deep combination's remaining pages.
                if self.shutdown_requested() {
                    info!("Shutdown requested, stopping discovery");
                    break 'combos;
                }

                match self.client.search(combo, page).await {
                    Ok(search_page) => {
                        report.pages_fetched += 1;
                        report.discovered += self.queue.enqueue_batch(&search_page.ids).await?;

                        debug!(
                            combo = %combo,
                            page,
                            found = search_page.ids.len(),
                            "Fetched search page"
                        );

                        if !search_page.has_more {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(combo = %combo, page, error = %e, "Search failed, skipping combination");
                        report.failed_combinations += 1;
                        break;
                    }
                }

                tokio::time::sleep(self.config.request_delay.sample()).await;
            }

            info!(
                combo = %combo,
                discovered = report.discovered,
                "Finished combination"
            );
        }

        info!(
            combinations = report.combinations,
            failed = report.failed_combinations,
            pages = report.pages_fetched,
            discovered = report.discovered,
            "Discovery pass complete"
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
}
