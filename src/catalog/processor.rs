//! Per-item processing seam between the work queue and the catalog.
//!
//! Workers only see the `ItemProcessor` trait; what "processing" means is
//! supplied by the caller. The in-repo implementation fetches full detail
//! by id and hands it to a `ListingSink`, the boundary to the downstream
//! transform/ingest service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::client::CatalogClient;
use super::types::{CatalogResult, ListingDetail};

/// Performs the per-item work for one dequeued identifier.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// Processes a single item. An error here counts as one failed
    /// delivery attempt against the item's retry budget.
    async fn process(&self, id: &str) -> CatalogResult<()>;
}

/// Receives fetched listing details for downstream handling.
///
/// The actual transform and ingest pipeline lives outside this crate;
/// implementations of this trait are the hand-off point.
#[async_trait]
pub trait ListingSink: Send + Sync {
    /// Delivers one fetched detail downstream.
    async fn deliver(&self, detail: &ListingDetail) -> CatalogResult<()>;
}

/// Sink that logs each delivered detail. Useful for dry runs and as the
/// default when no ingest service is wired up.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl ListingSink for LogSink {
    async fn deliver(&self, detail: &ListingDetail) -> CatalogResult<()> {
        debug!(
            id = %detail.id,
            title = detail.title.as_deref().unwrap_or(""),
            price = detail.price,
            "Fetched listing detail"
        );
        Ok(())
    }
}

/// Processor that fetches full detail for each id and forwards it to a sink.
pub struct DetailProcessor {
    client: Arc<CatalogClient>,
    sink: Arc<dyn ListingSink>,
}

impl DetailProcessor {
    /// Creates a processor over a catalog client and a sink.
    pub fn new(client: Arc<CatalogClient>, sink: Arc<dyn ListingSink>) -> Self {
        Self { client, sink }
    }
}

#[async_trait]
impl ItemProcessor for DetailProcessor {
    async fn process(&self, id: &str) -> CatalogResult<()> {
        let detail = self.client.fetch_detail(id).await?;
        self.sink.deliver(&detail).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_log_sink_accepts_detail() {
        let sink = LogSink;
        let detail = ListingDetail {
            id: "item-1".to_string(),
            title: Some("Two-bedroom apartment".to_string()),
            region: Some("north".to_string()),
            category: Some("apartment".to_string()),
            deal_type: Some("rent".to_string()),
            price: Some(950.0),
            attributes: serde_json::Value::Null,
            fetched_at: Utc::now(),
        };

        assert!(sink.deliver(&detail).await.is_ok());
    }
}
