//! Environment-driven configuration for the harvester.
//!
//! All processes (coordinator, workers, operator commands) read the same
//! configuration surface: the coordination store location, the portal
//! namespace, rate-limit delay bounds, retry limits, and paging caps.

use std::time::Duration;

use rand::RngExt;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Inclusive bounds for a randomized delay, in milliseconds.
///
/// Used for rate-limit jitter between outbound API calls and for the
/// longer backoff after a processing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayBounds {
    /// Minimum delay in milliseconds.
    pub min_ms: u64,
    /// Maximum delay in milliseconds.
    pub max_ms: u64,
}

impl DelayBounds {
    /// Creates new delay bounds.
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Samples a uniformly random delay within the bounds.
    pub fn sample(&self) -> Duration {
        let ms = rand::rng().random_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }
}

/// Configuration for the harvester, loaded from the environment.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Redis connection URL for the coordination store.
    pub redis_url: String,
    /// Portal name, used as the key namespace in the coordination store.
    pub portal: String,
    /// Base URL of the catalog API. Required for discovery and processing,
    /// not for operator commands that only touch the store.
    pub api_base_url: Option<String>,
    /// Number of items requested per search page.
    pub page_size: u32,
    /// Maximum pages fetched per search combination.
    pub max_pages: u32,
    /// Maximum delivery attempts per item before it is marked failed.
    pub retry_limit: u32,
    /// Jitter between outbound API calls.
    pub request_delay: DelayBounds,
    /// Longer jitter applied after a processing error.
    pub error_backoff: DelayBounds,
    /// Bounded wait for each dequeue attempt.
    pub dequeue_timeout: Duration,
    /// Consecutive empty dequeues before a worker stops.
    pub max_empty_checks: u32,
    /// Override for the region search dimension (comma-separated env value).
    pub regions: Option<Vec<String>>,
    /// Override for the category search dimension.
    pub categories: Option<Vec<String>>,
    /// Override for the deal-type search dimension.
    pub deal_types: Option<Vec<String>>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            portal: "portal".to_string(),
            api_base_url: None,
            page_size: 50,
            max_pages: 20,
            retry_limit: 3,
            request_delay: DelayBounds::new(500, 2000),
            error_backoff: DelayBounds::new(5000, 15000),
            dequeue_timeout: Duration::from_secs(5),
            max_empty_checks: 3,
            regions: None,
            categories: None,
            deal_types: None,
        }
    }
}

impl HarvestConfig {
    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Coordination store URL (default: redis://localhost:6379)
    /// - `HARVEST_PORTAL`: Key namespace for queue state (default: portal)
    /// - `HARVEST_API_BASE`: Catalog API base URL (required for discover/work)
    /// - `HARVEST_PAGE_SIZE`: Items per search page (default: 50)
    /// - `HARVEST_MAX_PAGES`: Page cap per search combination (default: 20)
    /// - `HARVEST_RETRY_LIMIT`: Attempts before an item is failed (default: 3)
    /// - `HARVEST_DELAY_MIN_MS` / `HARVEST_DELAY_MAX_MS`: Rate-limit jitter (default: 500-2000)
    /// - `HARVEST_BACKOFF_MIN_MS` / `HARVEST_BACKOFF_MAX_MS`: Error backoff (default: 5000-15000)
    /// - `HARVEST_DEQUEUE_TIMEOUT_SECS`: Bounded dequeue wait (default: 5)
    /// - `HARVEST_MAX_EMPTY_CHECKS`: Empty dequeues before worker exit (default: 3)
    /// - `HARVEST_REGIONS` / `HARVEST_CATEGORIES` / `HARVEST_DEAL_TYPES`:
    ///   Comma-separated search dimension overrides
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an unparseable value or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REDIS_URL") {
            config.redis_url = val;
        }

        if let Ok(val) = std::env::var("HARVEST_PORTAL") {
            config.portal = val;
        }

        if let Ok(val) = std::env::var("HARVEST_API_BASE") {
            config.api_base_url = Some(val);
        }

        if let Ok(val) = std::env::var("HARVEST_PAGE_SIZE") {
            config.page_size = parse_env_value(&val, "HARVEST_PAGE_SIZE")?;
        }

        if let Ok(val) = std::env::var("HARVEST_MAX_PAGES") {
            config.max_pages = parse_env_value(&val, "HARVEST_MAX_PAGES")?;
        }

        if let Ok(val) = std::env::var("HARVEST_RETRY_LIMIT") {
            config.retry_limit = parse_env_value(&val, "HARVEST_RETRY_LIMIT")?;
        }

        if let Ok(val) = std::env::var("HARVEST_DELAY_MIN_MS") {
            config.request_delay.min_ms = parse_env_value(&val, "HARVEST_DELAY_MIN_MS")?;
        }

        if let Ok(val) = std::env::var("HARVEST_DELAY_MAX_MS") {
            config.request_delay.max_ms = parse_env_value(&val, "HARVEST_DELAY_MAX_MS")?;
        }

        if let Ok(val) = std::env::var("HARVEST_BACKOFF_MIN_MS") {
            config.error_backoff.min_ms = parse_env_value(&val, "HARVEST_BACKOFF_MIN_MS")?;
        }

        if let Ok(val) = std::env::var("HARVEST_BACKOFF_MAX_MS") {
            config.error_backoff.max_ms = parse_env_value(&val, "HARVEST_BACKOFF_MAX_MS")?;
        }

        if let Ok(val) = std::env::var("HARVEST_DEQUEUE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "HARVEST_DEQUEUE_TIMEOUT_SECS")?;
            config.dequeue_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("HARVEST_MAX_EMPTY_CHECKS") {
            config.max_empty_checks = parse_env_value(&val, "HARVEST_MAX_EMPTY_CHECKS")?;
        }

        if let Ok(val) = std::env::var("HARVEST_REGIONS") {
            config.regions = Some(parse_env_list(&val));
        }

        if let Ok(val) = std::env::var("HARVEST_CATEGORIES") {
            config.categories = Some(parse_env_list(&val));
        }

        if let Ok(val) = std::env::var("HARVEST_DEAL_TYPES") {
            config.deal_types = Some(parse_env_list(&val));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.portal.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "portal cannot be empty".to_string(),
            ));
        }

        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        if self.page_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "page_size must be greater than 0".to_string(),
            ));
        }

        if self.max_pages == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_pages must be greater than 0".to_string(),
            ));
        }

        if self.max_empty_checks == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_empty_checks must be greater than 0".to_string(),
            ));
        }

        if self.dequeue_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "dequeue_timeout must be at least 1 second".to_string(),
            ));
        }

        if self.request_delay.min_ms > self.request_delay.max_ms {
            return Err(ConfigError::ValidationFailed(
                "request_delay min_ms cannot exceed max_ms".to_string(),
            ));
        }

        if self.error_backoff.min_ms > self.error_backoff.max_ms {
            return Err(ConfigError::ValidationFailed(
                "error_backoff min_ms cannot exceed max_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the portal namespace.
    pub fn with_portal(mut self, portal: impl Into<String>) -> Self {
        self.portal = portal.into();
        self
    }

    /// Builder method to set the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Builder method to set the catalog API base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Builder method to set the retry limit.
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Builder method to set the page cap per search combination.
    pub fn with_max_pages(mut self, max: u32) -> Self {
        self.max_pages = max;
        self
    }

    /// Builder method to set the rate-limit jitter bounds.
    pub fn with_request_delay(mut self, bounds: DelayBounds) -> Self {
        self.request_delay = bounds;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse a comma-separated environment variable into a list.
fn parse_env_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
