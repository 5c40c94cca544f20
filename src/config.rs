//! Configuration for the gateway.
//!
//! # Example
//!
//! ```
//! use datastore_gateway::GatewayConfig;
//!
//! // Minimal config (uses defaults)
//! let config = GatewayConfig::default();
//! assert_eq!(config.cache_max_bytes, 100 * 1024 * 1024); // 100 MB
//! assert_eq!(config.max_attempts, 3);
//!
//! // Full config
//! let config = GatewayConfig {
//!     cache_ttl_secs: 60,
//!     budget_per_window: 50,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::resilience::retry::RetryConfig;

/// Configuration for the gateway.
///
/// All fields have sensible defaults matching the backend's observed quota
/// behavior. Passed at construction; not re-read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Total retry attempts per remote call (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds (default: 500)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Backoff cap in milliseconds (default: 5000)
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Requests allowed per budget window, per operation class (default: 100)
    #[serde(default = "default_budget_per_window")]
    pub budget_per_window: u32,

    /// Budget window for reads, in seconds (default: 6)
    #[serde(default = "default_short_window_secs")]
    pub read_window_secs: u64,

    /// Budget window for writes, in seconds (default: 6)
    #[serde(default = "default_short_window_secs")]
    pub write_window_secs: u64,

    /// Budget window for deletes, in seconds (default: 6)
    #[serde(default = "default_short_window_secs")]
    pub delete_window_secs: u64,

    /// Budget window for key listing, in seconds (default: 60)
    #[serde(default = "default_list_window_secs")]
    pub list_window_secs: u64,

    /// Cache entry time-to-live, in seconds (default: 300)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Cache byte ceiling (default: 100 MB)
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: usize,

    /// Cache entry-count ceiling (default: 50,000)
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Operation record ring-buffer capacity (default: 50,000)
    #[serde(default = "default_metrics_capacity")]
    pub metrics_capacity: usize,

    /// Minimum gap between alert callback storms, in seconds (default: 30)
    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: u64,

    /// p95 latency alert threshold, in milliseconds (default: 1000)
    #[serde(default = "default_alert_p95_ms")]
    pub alert_p95_ms: u64,

    /// Success-rate alert floor (default: 0.95)
    #[serde(default = "default_alert_min_success_rate")]
    pub alert_min_success_rate: f64,

    /// Page size requested from the backend when listing keys (default: 100)
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_retry_max_delay_ms() -> u64 {
    5_000
}
fn default_budget_per_window() -> u32 {
    100
}
fn default_short_window_secs() -> u64 {
    6
}
fn default_list_window_secs() -> u64 {
    60
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_cache_max_bytes() -> usize {
    100 * 1024 * 1024
}
fn default_cache_max_entries() -> usize {
    50_000
}
fn default_metrics_capacity() -> usize {
    50_000
}
fn default_alert_cooldown_secs() -> u64 {
    30
}
fn default_alert_p95_ms() -> u64 {
    1_000
}
fn default_alert_min_success_rate() -> f64 {
    0.95
}
fn default_list_page_size() -> usize {
    100
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            budget_per_window: default_budget_per_window(),
            read_window_secs: default_short_window_secs(),
            write_window_secs: default_short_window_secs(),
            delete_window_secs: default_short_window_secs(),
            list_window_secs: default_list_window_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_bytes: default_cache_max_bytes(),
            cache_max_entries: default_cache_max_entries(),
            metrics_capacity: default_metrics_capacity(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
            alert_p95_ms: default_alert_p95_ms(),
            alert_min_success_rate: default_alert_min_success_rate(),
            list_page_size: default_list_page_size(),
        }
    }
}

impl GatewayConfig {
    /// Derive the retry configuration for remote calls.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter: RetryConfig::DEFAULT_JITTER,
        }
    }

    /// Cache TTL as a `Duration`.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
