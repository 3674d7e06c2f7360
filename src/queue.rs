//! Crash-resumable, deduplicating work queue on the coordination store.
//!
//! The queue owns the item lifecycle within one portal namespace:
//!
//! ```text
//! (absent) --discover--> queued --dequeue--> in-flight --ack-success--> processed
//! in-flight --ack-failure, attempts <= limit--> queued (attempt+1)
//! in-flight --ack-failure, attempts >  limit--> failed
//! ```
//!
//! # Key Namespace
//!
//! For a portal named `P` the queue uses six keys:
//!
//! - `P:queue` — FIFO list of ids awaiting processing
//! - `P:all_ids` — set of every id ever discovered (the dedup gate)
//! - `P:processed` — set of ids whose work completed
//! - `P:failed` — set of ids that exhausted their retries
//! - `P:retries` — hash of id -> attempt count
//! - `P:stats` — hash of queue metadata (`started_at`)
//!
//! # Delivery Guarantee
//!
//! At-least-once: a crash between dequeue and ack redelivers the id to a
//! later consumer. Consumers defend with the `is_processed` skip-check and
//! idempotent acks rather than trying to eliminate redelivery.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{CoordinationStore, StoreError};

/// Batch enqueues are partitioned into chunks of this size so no single
/// pipelined group monopolizes the shared store.
const ENQUEUE_CHUNK: usize = 1000;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The underlying coordination store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Key names for one portal namespace.
#[derive(Debug, Clone)]
struct QueueKeys {
    queue: String,
    all_ids: String,
    processed: String,
    failed: String,
    retries: String,
    stats: String,
}

impl QueueKeys {
    fn new(portal: &str) -> Self {
        Self {
            queue: format!("{}:queue", portal),
            all_ids: format!("{}:all_ids", portal),
            processed: format!("{}:processed", portal),
            failed: format!("{}:failed", portal),
            retries: format!("{}:retries", portal),
            stats: format!("{}:stats", portal),
        }
    }

    fn all(&self) -> Vec<String> {
        vec![
            self.queue.clone(),
            self.all_ids.clone(),
            self.processed.clone(),
            self.failed.clone(),
            self.retries.clone(),
            self.stats.clone(),
        ]
    }
}

/// Point-in-time queue statistics.
///
/// Fields are read independently, so a caller may observe slight
/// cross-field inconsistency while the queue is in motion.
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Portal namespace the stats belong to.
    pub portal: String,
    /// Number of ids currently awaiting processing.
    pub queue_depth: u64,
    /// Number of ids ever discovered.
    pub total_discovered: u64,
    /// Number of ids processed successfully.
    pub processed_count: u64,
    /// Number of ids that exhausted their retries.
    pub failed_count: u64,
    /// When this namespace was first initialized.
    pub started_at: Option<DateTime<Utc>>,
}

/// Deduplicating work queue for one portal namespace.
pub struct WorkQueue {
    store: CoordinationStore,
    keys: QueueKeys,
    portal: String,
}

impl WorkQueue {
    /// Connects to the coordination store and opens the portal namespace.
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the store connection fails.
    pub async fn connect(redis_url: &str, portal: &str) -> Result<Self, QueueError> {
        let store = CoordinationStore::connect(redis_url).await?;
        Self::open(store, portal).await
    }

    /// Opens the portal namespace on an existing store handle.
    ///
    /// Records `started_at` on first initialization; subsequent opens
    /// never overwrite it.
    pub async fn open(store: CoordinationStore, portal: &str) -> Result<Self, QueueError> {
        let queue = Self {
            store,
            keys: QueueKeys::new(portal),
            portal: portal.to_string(),
        };

        let now = Utc::now().timestamp().to_string();
        let first = queue
            .store
            .hash_set_if_absent(&queue.keys.stats, "started_at", &now)
            .await?;
        if first {
            info!(portal = %queue.portal, "Initialized queue namespace");
        }

        Ok(queue)
    }

    /// Enqueues a single id, returning whether this call discovered it.
    ///
    /// The set insert into `all_ids` is the atomic dedup gate: only the
    /// call that first inserts the id pushes it onto the queue, so repeat
    /// discoveries are idempotent.
    pub async fn enqueue(&self, id: &str) -> Result<bool, QueueError> {
        let was_new = self.store.set_insert(&self.keys.all_ids, id).await?;
        if was_new {
            self.store.list_push(&self.keys.queue, id).await?;
        }
        Ok(was_new)
    }

    /// Enqueues a batch of ids, returning how many were newly discovered.
    ///
    /// Large batches are partitioned into bounded chunks to keep each
    /// pipelined group small.
    pub async fn enqueue_batch(&self, ids: &[String]) -> Result<usize, QueueError> {
        let mut newly_discovered = 0;

        for chunk in ids.chunks(ENQUEUE_CHUNK) {
            let new_flags = self
                .store
                .set_insert_many(&self.keys.all_ids, chunk)
                .await?;

            let new_ids: Vec<String> = chunk
                .iter()
                .zip(new_flags)
                .filter(|(_, is_new)| *is_new)
                .map(|(id, _)| id.clone())
                .collect();

            self.store.list_push_many(&self.keys.queue, &new_ids).await?;
            newly_discovered += new_ids.len();
        }

        debug!(
            portal = %self.portal,
            submitted = ids.len(),
            new = newly_discovered,
            "Enqueued batch"
        );

        Ok(newly_discovered)
    }

    /// Dequeues the next id, blocking up to `timeout`.
    ///
    /// Returns `None` on timeout so the caller can poll for shutdown or
    /// queue exhaustion.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<String>, QueueError> {
        let id = self
            .store
            .list_pop_blocking(&self.keys.queue, timeout)
            .await?;
        Ok(id)
    }

    /// Returns whether an id has already been processed.
    pub async fn is_processed(&self, id: &str) -> Result<bool, QueueError> {
        let processed = self.store.set_contains(&self.keys.processed, id).await?;
        Ok(processed)
    }

    /// Marks an id as processed. Idempotent.
    pub async fn ack_success(&self, id: &str) -> Result<(), QueueError> {
        self.store.set_insert(&self.keys.processed, id).await?;
        Ok(())
    }

    /// Records a failed attempt, returning whether the id was requeued.
    ///
    /// The retry counter increment is atomic and the requeue decision is
    /// made from its return value, so two workers acking the same id
    /// cannot both requeue it past the limit. Once the count exceeds
    /// `limit` the id moves to `failed` permanently.
    pub async fn ack_failure(
        &self,
        id: &str,
        limit: u32,
        reason: Option<&str>,
    ) -> Result<bool, QueueError> {
        let attempts = self.store.hash_incr(&self.keys.retries, id, 1).await?;

        if attempts <= i64::from(limit) {
            self.store.list_push(&self.keys.queue, id).await?;
            debug!(
                portal = %self.portal,
                id,
                attempts,
                reason = reason.unwrap_or("unspecified"),
                "Requeued failed item"
            );
            Ok(true)
        } else {
            self.store.set_insert(&self.keys.failed, id).await?;
            warn!(
                portal = %self.portal,
                id,
                attempts,
                reason = reason.unwrap_or("unspecified"),
                "Item exhausted retries"
            );
            Ok(false)
        }
    }

    /// Returns the attempt count recorded for an id.
    pub async fn retry_count(&self, id: &str) -> Result<u32, QueueError> {
        let raw = self.store.hash_get(&self.keys.retries, id).await?;
        let count = raw.and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
        Ok(count)
    }

    /// Returns the ids currently in the failed set.
    pub async fn failed_ids(&self) -> Result<Vec<String>, QueueError> {
        let ids = self.store.set_members(&self.keys.failed).await?;
        Ok(ids)
    }

    /// Reads point-in-time queue statistics.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let (queue_depth, total_discovered, processed_count, failed_count, started_raw) = tokio::try_join!(
            self.store.list_len(&self.keys.queue),
            self.store.set_len(&self.keys.all_ids),
            self.store.set_len(&self.keys.processed),
            self.store.set_len(&self.keys.failed),
            self.store.hash_get(&self.keys.stats, "started_at"),
        )?;

        let started_at = started_raw
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(QueueStats {
            portal: self.portal.clone(),
            queue_depth,
            total_discovered,
            processed_count,
            failed_count,
            started_at,
        })
    }

    /// Moves every failed id back onto the queue with a reset retry
    /// counter, returning how many were requeued.
    ///
    /// Operator-triggered recovery, not part of the automatic retry path.
    /// Each id moves in one atomic transaction so a failure mid-way never
    /// leaves an id both failed and queued.
    pub async fn retry_all_failed(&self) -> Result<usize, QueueError> {
        let failed = self.store.set_members(&self.keys.failed).await?;

        for id in &failed {
            let keys = self.keys.clone();
            self.store
                .exec_atomic(|pipe| {
                    pipe.srem(&keys.failed, id);
                    pipe.hdel(&keys.retries, id);
                    pipe.lpush(&keys.queue, id);
                })
                .await?;
        }

        if !failed.is_empty() {
            info!(portal = %self.portal, count = failed.len(), "Requeued failed items");
        }

        Ok(failed.len())
    }

    /// Destroys all state for this namespace. Irreversible.
    pub async fn clear(&self) -> Result<(), QueueError> {
        self.store.delete(&self.keys.all()).await?;
        warn!(portal = %self.portal, "Cleared all queue state");
        Ok(())
    }

    /// Returns the portal namespace name.
    pub fn portal(&self) -> &str {
        &self.portal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keys_namespace() {
        let keys = QueueKeys::new("housing");
        assert_eq!(keys.queue, "housing:queue");
        assert_eq!(keys.all_ids, "housing:all_ids");
        assert_eq!(keys.processed, "housing:processed");
        assert_eq!(keys.failed, "housing:failed");
        assert_eq!(keys.retries, "housing:retries");
        assert_eq!(keys.stats, "housing:stats");
    }

    #[test]
    fn test_queue_keys_all_covers_namespace() {
        let keys = QueueKeys::new("p");
        let all = keys.all();
        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|k| k.starts_with("p:")));
    }

    #[test]
    fn test_enqueue_chunking_bounds() {
        let ids: Vec<String> = (0..2500).map(|i| format!("id-{}", i)).collect();
        let chunks: Vec<_> = ids.chunks(ENQUEUE_CHUNK).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[2].len(), 500);
    }

    #[test]
    fn test_stats_started_at_parsing() {
        let parsed = "1700000000"
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        assert!(parsed.is_some());

        let garbage = "not-a-timestamp"
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        assert!(garbage.is_none());
    }

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::Store(StoreError::ConnectionFailed("timeout".to_string()));
        assert!(err.to_string().contains("timeout"));
    }
}
