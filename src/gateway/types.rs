//! Public types for the gateway façade.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::metrics::OpsSummary;

/// Per-call options: timeout, cancellation, cache bypass.
///
/// Both the timeout and the token are honored at every suspension point
/// (before the remote call, between retries). Budget already consumed by an
/// admitted call is never refunded on cancellation.
///
/// # Example
///
/// ```
/// use datastore_gateway::CallOptions;
/// use std::time::Duration;
///
/// let opts = CallOptions::default().with_timeout(Duration::from_secs(2));
/// assert!(opts.timeout.is_some());
/// assert!(!opts.bypass_cache);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overall deadline for the call, including retries and backoff.
    pub timeout: Option<Duration>,
    /// Caller-owned cancellation token.
    pub cancel: Option<CancellationToken>,
    /// Skip the cache on the read path (the fetched value still populates it).
    pub bypass_cache: bool,
}

impl CallOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    /// Absolute deadline derived from `timeout`, anchored at call start.
    #[must_use]
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }
}

/// Remaining request budget per operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetSnapshot {
    pub read: u32,
    pub write: u32,
    pub delete: u32,
    pub list: u32,
}

/// Point-in-time gateway health for dashboards.
///
/// Produced by [`super::StoreGateway::metrics_summary`]; cheap to build
/// (no I/O, in-memory aggregation only).
#[derive(Debug, Clone)]
pub struct PerformanceSnapshot {
    /// Latency/success/throughput over the trailing evaluation window.
    pub ops: OpsSummary,
    /// Lifetime cache hit rate (0.0 - 1.0).
    pub cache_hit_rate: f64,
    pub cache_entries: usize,
    pub cache_bytes: usize,
    pub cache_max_bytes: usize,
    pub budget_remaining: BudgetSnapshot,
}
