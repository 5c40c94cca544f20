// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # DataStore Gateway
//!
//! A resilient access layer for rate-limited, eventually-consistent
//! key-value backends.
//!
//! ## Architecture
//!
//! The gateway wraps every remote call in the same pipeline:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StoreGateway (façade)                   │
//! │  • get / set / delete / list_keys                           │
//! │  • typed errors for every expected failure mode             │
//! └─────────────────────────────────────────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TtlCache (reads only)                     │
//! │  • TTL expiry, LRU eviction under byte/entry ceilings       │
//! │  • write-invalidate consistency                             │
//! └─────────────────────────────────────────────────────────────┘
//!               │ (miss)
//!               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RequestBudget                          │
//! │  • per-class fixed windows (read/write/delete/list)         │
//! │  • non-blocking: exhaustion returns BudgetExceeded          │
//! └─────────────────────────────────────────────────────────────┘
//!               │ (admitted)
//!               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              RemoteStore (with retry + backoff)             │
//! │  • exponential backoff, ±20% jitter, cancellation-aware     │
//! │  • permanent errors bypass retry entirely                   │
//! └─────────────────────────────────────────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MetricsRecorder                         │
//! │  • bounded operation history, percentile summaries          │
//! │  • cache hit rate, threshold alerts with cooldown           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use datastore_gateway::{GatewayConfig, InMemoryStore, StoreGateway, StoreKey};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let backend = Arc::new(InMemoryStore::new());
//!     let gateway = StoreGateway::new(GatewayConfig::default(), backend);
//!
//!     let key = StoreKey::unscoped("PlayerData", "player_1234").unwrap();
//!
//!     // Write (validates payload, gates on budget, invalidates cache)
//!     let version = gateway.set(&key, json!({"level": 5})).await.unwrap();
//!     assert_eq!(version, "v1");
//!
//!     // Read (cache miss → remote fetch → cache populate)
//!     let value = gateway.get(&key).await.unwrap().unwrap();
//!     assert_eq!(value["level"], 5);
//!
//!     // Observability
//!     let snapshot = gateway.metrics_summary();
//!     assert!(snapshot.ops.sample_count > 0);
//! }
//! ```
//!
//! ## Features
//!
//! - **Request Budgeting**: independent fixed windows per operation class,
//!   matching backends that apportion quota by call type
//! - **Retry with Backoff**: exponential delays, jitter, strict
//!   permanent/transient classification
//! - **TTL + LRU Caching**: read-through, write-invalidate; byte and entry
//!   ceilings enforced by LRU sweeps
//! - **Operation Metrics**: bounded ring buffer, p50/p95/p99, alerting,
//!   `metrics` facade export
//! - **Adaptive Tuning**: optional feedback loop sizing the cache and pacing
//!   requests from observed health
//! - **Cancellation**: per-call timeouts and tokens honored at every
//!   suspension point
//!
//! ## Modules
//!
//! - [`gateway`]: the [`StoreGateway`] façade
//! - [`backend`]: the [`RemoteStore`] seam and the in-memory reference store
//! - [`budget`]: per-class request windows
//! - [`cache`]: the TTL + LRU cache
//! - [`resilience`]: retry with backoff
//! - [`metrics`]: operation records, summaries, alerts
//! - [`adaptive`]: the tuning overlay

pub mod adaptive;
pub mod backend;
pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod key;
pub mod metrics;
pub mod resilience;

pub use adaptive::{AdaptiveConfig, AdaptiveController, AdaptiveHandle};
pub use backend::memory::InMemoryStore;
pub use backend::traits::{KeyPage, RemoteStore, VersionedValue};
pub use budget::{BudgetConfig, OpClass, RequestBudget};
pub use cache::{CachedValue, TtlCache};
pub use config::GatewayConfig;
pub use error::{GatewayError, MAX_VALUE_BYTES};
pub use gateway::{BudgetSnapshot, CallOptions, PerformanceSnapshot, StoreGateway};
pub use key::StoreKey;
pub use metrics::{
    Alert, AlertConfig, MetricsRecorder, OpOutcome, OperationRecord, OpsSummary,
};
pub use resilience::retry::{run_with_retry, RetryConfig, RetryOutcome};
