// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Gateway façade.
//!
//! [`StoreGateway`] is the single entry point composing the resilience
//! pieces: every read/write/delete/list goes budget check → cache lookup
//! (reads) → remote call with retry → cache update → metrics recording.
//!
//! ```text
//! caller ──▶ get/set/delete/list_keys
//!              │
//!              ├─ TtlCache ──── read-path short-circuit (hit: return)
//!              ├─ RequestBudget ── admit or BudgetExceeded
//!              ├─ RemoteStore ──── with retry + backoff + jitter
//!              ├─ MetricsRecorder ─ one OperationRecord per round-trip
//!              └─ TtlCache ──── reads populate, writes invalidate
//! ```
//!
//! One gateway instance owns all of its collaborators; there is no global
//! state, so independent instances (e.g. in tests) never interfere.
//!
//! # Example
//!
//! ```
//! use datastore_gateway::{GatewayConfig, InMemoryStore, StoreGateway, StoreKey};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gateway = StoreGateway::new(GatewayConfig::default(), Arc::new(InMemoryStore::new()));
//! let key = StoreKey::unscoped("PlayerData", "player_1").unwrap();
//!
//! gateway.set(&key, json!({"level": 5})).await.unwrap();
//! let value = gateway.get(&key).await.unwrap().unwrap();
//! assert_eq!(value["level"], 5);
//! # }
//! ```

mod api;
mod types;

pub use types::{BudgetSnapshot, CallOptions, PerformanceSnapshot};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::backend::traits::RemoteStore;
use crate::budget::{BudgetConfig, OpClass, RequestBudget};
use crate::cache::TtlCache;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::metrics::{Alert, AlertConfig, MetricsRecorder, OpsSummary};
use crate::resilience::retry::RetryConfig;

/// Window used by [`StoreGateway::metrics_summary`] and the alert evaluator.
const SUMMARY_WINDOW: Duration = Duration::from_secs(60);

/// Resilient façade over a rate-limited remote key-value store.
///
/// Cheap to share: wrap in an `Arc` and clone the handle. All internal
/// state is synchronized; no lock is held across a suspension point.
pub struct StoreGateway {
    config: GatewayConfig,
    retry: RetryConfig,
    backend: Arc<dyn RemoteStore>,
    cache: Arc<TtlCache>,
    budget: Arc<RequestBudget>,
    recorder: Arc<MetricsRecorder>,
    /// Advisory inter-request delay in microseconds, tuned by the adaptive
    /// controller. Zero means no padding.
    throttle_pad_micros: Arc<AtomicU64>,
}

impl StoreGateway {
    #[must_use]
    pub fn new(config: GatewayConfig, backend: Arc<dyn RemoteStore>) -> Self {
        let cache = Arc::new(TtlCache::new(
            config.cache_max_bytes,
            config.cache_max_entries,
        ));
        let budget = Arc::new(RequestBudget::new(BudgetConfig::from_gateway(&config)));
        let recorder = Arc::new(MetricsRecorder::new(
            config.metrics_capacity,
            AlertConfig {
                p95_threshold: Duration::from_millis(config.alert_p95_ms),
                min_success_rate: config.alert_min_success_rate,
                cooldown: Duration::from_secs(config.alert_cooldown_secs),
                eval_window: SUMMARY_WINDOW,
                ..Default::default()
            },
        ));
        let retry = config.retry_config();

        Self {
            config,
            retry,
            backend,
            cache,
            budget,
            recorder,
            throttle_pad_micros: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop one cached entry (manual control; writes do this themselves).
    pub fn invalidate(&self, key: &crate::key::StoreKey) {
        self.cache.invalidate(&key.canonical());
    }

    /// Drop every cached entry for a store + scope, after bulk modification.
    pub fn invalidate_store(&self, store: &str, scope: &str) -> usize {
        self.cache
            .invalidate_prefix(&crate::key::prefix_for(store, scope))
    }

    /// Requests left in the class's current budget window.
    #[must_use]
    pub fn budget_remaining(&self, class: OpClass) -> u32 {
        self.budget.remaining(class)
    }

    /// Time until the class's budget window refills.
    #[must_use]
    pub fn budget_reset_in(&self, class: OpClass) -> Duration {
        self.budget.time_until_reset(class)
    }

    /// Register a callback for health-threshold alerts.
    pub fn on_alert(&self, callback: impl Fn(&Alert) + Send + Sync + 'static) {
        self.recorder.on_alert(callback);
    }

    /// Point-in-time health snapshot for dashboards. Also refreshes the
    /// exported occupancy gauges.
    #[must_use]
    pub fn metrics_summary(&self) -> PerformanceSnapshot {
        let budget_remaining = BudgetSnapshot {
            read: self.budget.remaining(OpClass::Read),
            write: self.budget.remaining(OpClass::Write),
            delete: self.budget.remaining(OpClass::Delete),
            list: self.budget.remaining(OpClass::List),
        };

        crate::metrics::set_cache_gauges(self.cache.len(), self.cache.bytes_used());
        for class in OpClass::ALL {
            crate::metrics::set_budget_gauge(class, self.budget.remaining(class));
        }

        PerformanceSnapshot {
            ops: self.recorder.summary(SUMMARY_WINDOW),
            cache_hit_rate: self.recorder.cache_hit_rate(),
            cache_entries: self.cache.len(),
            cache_bytes: self.cache.bytes_used(),
            cache_max_bytes: self.cache.max_bytes(),
            budget_remaining,
        }
    }

    /// Rolling operation statistics over an arbitrary trailing window.
    #[must_use]
    pub fn ops_summary(&self, window: Duration) -> OpsSummary {
        self.recorder.summary(window)
    }

    pub(crate) fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub(crate) fn cache_handle(&self) -> Arc<TtlCache> {
        self.cache.clone()
    }

    pub(crate) fn recorder_handle(&self) -> Arc<MetricsRecorder> {
        self.recorder.clone()
    }

    pub(crate) fn throttle_pad_handle(&self) -> Arc<AtomicU64> {
        self.throttle_pad_micros.clone()
    }

    fn budget_exceeded(&self, class: OpClass) -> GatewayError {
        crate::metrics::record_budget_denied(class);
        GatewayError::BudgetExceeded {
            class,
            retry_after: self.budget.time_until_reset(class),
        }
    }

    /// Advisory inter-request pause set by the adaptive controller.
    /// A suspension point, so the caller's token is honored here too.
    async fn pad_delay(&self, cancel: Option<&CancellationToken>) -> Result<(), GatewayError> {
        let micros = self.throttle_pad_micros.load(Ordering::Relaxed);
        if micros == 0 {
            return Ok(());
        }
        let delay = Duration::from_micros(micros);
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = sleep(delay) => Ok(()),
                    _ = token.cancelled() => Err(GatewayError::Cancelled),
                }
            }
            None => {
                sleep(delay).await;
                Ok(())
            }
        }
    }
}
