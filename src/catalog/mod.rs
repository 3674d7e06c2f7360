//! Catalog API boundary: search, per-item detail, and the processing seam.
//!
//! Everything portal-schema-specific lives here, behind small types, so the
//! coordinator and workers stay schema-agnostic.

pub mod client;
pub mod processor;
pub mod types;

pub use client::CatalogClient;
pub use processor::{DetailProcessor, ItemProcessor, ListingSink, LogSink};
pub use types::{
    CatalogError, CatalogResult, ListingDetail, SearchCombo, SearchDimensions, SearchPage,
};
