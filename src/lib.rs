//! portal-harvest: distributed harvester for a rate-limited listings catalog.
//!
//! A discovery coordinator enumerates the catalog's search space and feeds a
//! deduplicating work queue in a shared coordination store; any number of
//! independent worker processes drain the queue, fetching per-item detail
//! with signed API requests. Queue state survives crashes and restarts, and
//! delivery is at-least-once.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod queue;
pub mod signer;
pub mod store;
pub mod worker;

// Re-export commonly used types
pub use config::{ConfigError, HarvestConfig};
pub use queue::{QueueError, QueueStats, WorkQueue};
pub use signer::{Credential, RequestSigner};
pub use store::{CoordinationStore, StoreError};
