// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Closed-loop tuning overlay.
//!
//! The controller periodically inspects recorder summaries and adjusts two
//! advisory knobs: the cache byte ceiling and the inter-request throttle
//! pad. It is best-effort tuning, not correctness-critical — every
//! adjustment is clamped, and a failing tick only logs.
//!
//! The loop runs as a spawned task with an explicit shutdown path; there is
//! no unbounded background loop.
//!
//! # Example
//!
//! ```
//! use datastore_gateway::{
//!     AdaptiveConfig, AdaptiveController, GatewayConfig, InMemoryStore, StoreGateway,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gateway = StoreGateway::new(GatewayConfig::default(), Arc::new(InMemoryStore::new()));
//! let controller = AdaptiveController::new(&gateway, AdaptiveConfig::default());
//! let handle = controller.spawn();
//!
//! // ... traffic ...
//!
//! handle.shutdown().await;
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::gateway::StoreGateway;
use crate::metrics::MetricsRecorder;

/// Tuning thresholds and bounds. Every adjustment stays inside
/// `[min_cache_bytes, max_cache_bytes]` and `[0, max_pad]`.
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    /// How often `tick()` runs (default: 1 s).
    pub sample_interval: Duration,
    /// Window the recorder summary is aggregated over (default: 60 s).
    pub eval_window: Duration,
    /// Ticks with fewer operations than this skip throttle adjustments.
    pub min_samples: usize,
    /// Grow the cache while the hit rate sits below this (default: 0.8).
    pub target_hit_rate: f64,
    /// Cache growth multiplier (default: 1.2 = +20%).
    pub grow_factor: f64,
    /// Cache shrink multiplier under memory pressure (default: 0.9 = -10%).
    pub shrink_factor: f64,
    /// Fill ratio above which the cache is shrunk (default: 0.9).
    pub fill_warn_ratio: f64,
    /// Error rate that increases the throttle pad (default: 0.05).
    pub high_error_rate: f64,
    /// Error rate below which the pad relaxes (default: 0.01).
    pub low_error_rate: f64,
    /// p95 considered "low latency" for relaxing the pad (default: 200 ms).
    pub relaxed_p95: Duration,
    /// Pad adjustment step (default: 10 ms).
    pub pad_step: Duration,
    /// Pad ceiling (default: 250 ms).
    pub max_pad: Duration,
    /// Cache ceiling floor (default: 1 MB).
    pub min_cache_bytes: usize,
    /// Cache ceiling bound; 0 means 4x the gateway's configured size.
    pub max_cache_bytes: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            eval_window: Duration::from_secs(60),
            min_samples: 20,
            target_hit_rate: 0.8,
            grow_factor: 1.2,
            shrink_factor: 0.9,
            fill_warn_ratio: 0.9,
            high_error_rate: 0.05,
            low_error_rate: 0.01,
            relaxed_p95: Duration::from_millis(200),
            pad_step: Duration::from_millis(10),
            max_pad: Duration::from_millis(250),
            min_cache_bytes: 1024 * 1024,
            max_cache_bytes: 0,
        }
    }
}

/// Periodic tuner observing one gateway's recorder and cache.
pub struct AdaptiveController {
    cache: Arc<TtlCache>,
    recorder: Arc<MetricsRecorder>,
    throttle_pad_micros: Arc<AtomicU64>,
    config: AdaptiveConfig,
    shutdown: CancellationToken,
}

/// Handle to a running controller task.
pub struct AdaptiveHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AdaptiveHandle {
    /// Stop the loop and wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    /// Token that stops the loop when cancelled (for wiring into a broader
    /// shutdown sequence).
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl AdaptiveController {
    #[must_use]
    pub fn new(gateway: &StoreGateway, mut config: AdaptiveConfig) -> Self {
        if config.max_cache_bytes == 0 {
            config.max_cache_bytes = gateway.config().cache_max_bytes.saturating_mul(4);
        }
        // Keep the clamp range well-formed for tiny gateway caches
        config.max_cache_bytes = config.max_cache_bytes.max(config.min_cache_bytes);
        Self {
            cache: gateway.cache_handle(),
            recorder: gateway.recorder_handle(),
            throttle_pad_micros: gateway.throttle_pad_handle(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the tick loop on the current runtime.
    #[must_use]
    pub fn spawn(self) -> AdaptiveHandle {
        let cancel = self.shutdown.clone();
        let interval = self.config.sample_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = ticker.tick() => self.tick(),
                }
            }
            debug!("Adaptive controller stopped");
        });
        AdaptiveHandle { cancel, task }
    }

    /// One evaluation pass. Synchronous and non-suspending; safe to call
    /// directly in tests.
    pub fn tick(&self) {
        self.tune_cache();
        self.tune_throttle();
    }

    fn tune_cache(&self) {
        let fill = self.cache.fill_ratio();
        let current = self.cache.max_bytes();

        if fill >= self.config.fill_warn_ratio {
            let shrunk = ((current as f64 * self.config.shrink_factor) as usize)
                .clamp(self.config.min_cache_bytes, self.config.max_cache_bytes);
            if shrunk < current {
                info!(from = current, to = shrunk, fill, "Shrinking cache ceiling");
                self.cache.set_max_bytes(shrunk);
            }
            return;
        }

        let hit_rate = self.recorder.cache_hit_rate();
        if self.recorder.cache_lookups() > 0 && hit_rate < self.config.target_hit_rate {
            let grown = ((current as f64 * self.config.grow_factor) as usize)
                .clamp(self.config.min_cache_bytes, self.config.max_cache_bytes);
            if grown > current {
                debug!(from = current, to = grown, hit_rate, "Growing cache ceiling");
                self.cache.set_max_bytes(grown);
            }
        }
    }

    fn tune_throttle(&self) {
        let summary = self.recorder.summary(self.config.eval_window);
        if summary.sample_count < self.config.min_samples {
            return;
        }

        let error_rate = 1.0 - summary.success_rate;
        let current = Duration::from_micros(self.throttle_pad_micros.load(Ordering::Relaxed));

        let next = if error_rate > self.config.high_error_rate {
            (current + self.config.pad_step).min(self.config.max_pad)
        } else if error_rate < self.config.low_error_rate && summary.p95 <= self.config.relaxed_p95
        {
            current.saturating_sub(self.config.pad_step)
        } else {
            current
        };

        if next != current {
            info!(
                from_us = current.as_micros() as u64,
                to_us = next.as_micros() as u64,
                error_rate,
                "Adjusting throttle pad"
            );
            self.throttle_pad_micros
                .store(next.as_micros() as u64, Ordering::Relaxed);
            gauge!("datastore_gateway_throttle_pad_micros").set(next.as_micros() as f64);
        }
    }
}
