//! Common types for the catalog API boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur talking to the catalog API.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Failed to parse response data.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// API rate limit exceeded.
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited {
        /// Optional retry-after duration in seconds.
        retry_after: Option<u64>,
    },

    /// Downstream delivery of a fetched detail failed.
    #[error("Sink delivery failed: {0}")]
    SinkError(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// One point in the discovery cross-product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCombo {
    /// Region code.
    pub region: String,
    /// Property category.
    pub category: String,
    /// Transaction type (sale, rent, ...).
    pub deal_type: String,
}

impl std::fmt::Display for SearchCombo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.region, self.category, self.deal_type)
    }
}

/// The full discovery space: every combination of region, category and
/// deal type known to the system.
#[derive(Debug, Clone)]
pub struct SearchDimensions {
    /// Region codes to search.
    pub regions: Vec<String>,
    /// Property categories to search.
    pub categories: Vec<String>,
    /// Transaction types to search.
    pub deal_types: Vec<String>,
}

impl Default for SearchDimensions {
    fn default() -> Self {
        Self {
            regions: to_strings(&["north", "south", "east", "west", "central"]),
            categories: to_strings(&["apartment", "house", "commercial", "land", "parking"]),
            deal_types: to_strings(&["sale", "rent"]),
        }
    }
}

impl SearchDimensions {
    /// Builds dimensions from optional overrides, falling back to the
    /// defaults for any dimension left unset.
    pub fn with_overrides(
        regions: Option<Vec<String>>,
        categories: Option<Vec<String>>,
        deal_types: Option<Vec<String>>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            regions: regions.unwrap_or(defaults.regions),
            categories: categories.unwrap_or(defaults.categories),
            deal_types: deal_types.unwrap_or(defaults.deal_types),
        }
    }

    /// Total number of search combinations.
    pub fn combination_count(&self) -> usize {
        self.regions.len() * self.categories.len() * self.deal_types.len()
    }

    /// Enumerates the full cross-product of search combinations.
    pub fn combinations(&self) -> Vec<SearchCombo> {
        let mut combos = Vec::with_capacity(self.combination_count());
        for region in &self.regions {
            for category in &self.categories {
                for deal_type in &self.deal_types {
                    combos.push(SearchCombo {
                        region: region.clone(),
                        category: category.clone(),
                        deal_type: deal_type.clone(),
                    });
                }
            }
        }
        combos
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    /// Item identifiers found on this page.
    pub ids: Vec<String>,
    /// Whether the API reports further pages for this combination.
    pub has_more: bool,
}

/// Full detail for one catalog item, as returned by the detail endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDetail {
    /// The item identifier.
    pub id: String,
    /// Human-readable title, if present.
    #[serde(default)]
    pub title: Option<String>,
    /// Region code the listing belongs to.
    #[serde(default)]
    pub region: Option<String>,
    /// Property category.
    #[serde(default)]
    pub category: Option<String>,
    /// Transaction type.
    #[serde(default)]
    pub deal_type: Option<String>,
    /// Asking price, if published.
    #[serde(default)]
    pub price: Option<f64>,
    /// Remaining portal-specific attributes, kept verbatim for the
    /// downstream transform step.
    #[serde(default)]
    pub attributes: serde_json::Value,
    /// When the detail was fetched.
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}
