// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Operation metrics: bounded in-process history plus the `metrics` facade.
//!
//! Every remote round-trip produces one [`OperationRecord`], appended O(1)
//! to a fixed-capacity ring buffer (oldest silently dropped). Summaries are
//! computed over a trailing window and never error on empty data.
//!
//! Records are also forwarded to the `metrics` crate so the hosting process
//! can attach any exporter (Prometheus, OTEL, ...).
//!
//! # Metric Naming Convention
//! - `datastore_gateway_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `class`: read, write, delete, list
//! - `outcome`: success, failure, throttled

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use tracing::warn;

use crate::budget::OpClass;

/// Terminal outcome of one gateway operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    Success,
    Failure,
    Throttled,
}

impl OpOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Throttled => "throttled",
        }
    }
}

/// One completed (or failed) operation.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub class: OpClass,
    pub key: String,
    pub started_at: Instant,
    pub completed_at: Instant,
    /// Total attempts; > 1 means retries occurred.
    pub attempts: u32,
    pub outcome: OpOutcome,
    /// Serialized payload size for writes, 0 otherwise.
    pub payload_bytes: usize,
}

impl OperationRecord {
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.completed_at.duration_since(self.started_at)
    }
}

/// Rolling statistics over a trailing window.
///
/// Zero-valued when no records fall inside the window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpsSummary {
    pub avg_latency: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    /// Successes / total. 0.0 when empty.
    pub success_rate: f64,
    /// Operations per second over the window.
    pub throughput_per_sec: f64,
    pub sample_count: usize,
}

/// Fired when a health threshold is crossed.
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// p95 latency exceeded the configured ceiling.
    HighLatency { p95: Duration, threshold: Duration },
    /// Success rate fell below the configured floor.
    LowSuccessRate { rate: f64, threshold: f64 },
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighLatency { p95, threshold } => {
                write!(f, "p95 latency {p95:?} above threshold {threshold:?}")
            }
            Self::LowSuccessRate { rate, threshold } => {
                write!(f, "success rate {rate:.3} below floor {threshold:.3}")
            }
        }
    }
}

/// Thresholds and pacing for alert callbacks.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub p95_threshold: Duration,
    pub min_success_rate: f64,
    /// Minimum gap between alerts; a sustained breach fires once per cooldown.
    pub cooldown: Duration,
    /// Window the thresholds are evaluated over.
    pub eval_window: Duration,
    /// Breaches on fewer samples than this are ignored.
    pub min_samples: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            p95_threshold: Duration::from_millis(1_000),
            min_success_rate: 0.95,
            cooldown: Duration::from_secs(30),
            eval_window: Duration::from_secs(60),
            min_samples: 10,
        }
    }
}

type AlertCallback = Box<dyn Fn(&Alert) + Send + Sync>;

/// Bounded operation history with derived statistics and alerting.
///
/// Cache hit rate comes from a dedicated counter pair, not from the record
/// stream: cache hits short-circuit before a record is ever produced.
pub struct MetricsRecorder {
    records: Mutex<VecDeque<OperationRecord>>,
    capacity: usize,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    alert_config: AlertConfig,
    callbacks: Mutex<Vec<AlertCallback>>,
    last_alert_at: Mutex<Option<Instant>>,
}

impl MetricsRecorder {
    #[must_use]
    pub fn new(capacity: usize, alert_config: AlertConfig) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(4_096))),
            capacity: capacity.max(1),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            alert_config,
            callbacks: Mutex::new(Vec::new()),
            last_alert_at: Mutex::new(None),
        }
    }

    /// Append one record, dropping the oldest past capacity.
    pub fn record(&self, record: OperationRecord) {
        counter!(
            "datastore_gateway_requests_total",
            "class" => record.class.label(),
            "outcome" => record.outcome.label()
        )
        .increment(1);
        histogram!(
            "datastore_gateway_request_seconds",
            "class" => record.class.label()
        )
        .record(record.latency().as_secs_f64());
        if record.attempts > 1 {
            counter!(
                "datastore_gateway_retries_total",
                "class" => record.class.label()
            )
            .increment(u64::from(record.attempts - 1));
        }
        if record.payload_bytes > 0 {
            histogram!("datastore_gateway_payload_bytes").record(record.payload_bytes as f64);
        }

        {
            let mut records = self.records.lock();
            if records.len() >= self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }

        self.maybe_alert();
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        counter!("datastore_gateway_cache_total", "outcome" => "hit").increment(1);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        counter!("datastore_gateway_cache_total", "outcome" => "miss").increment(1);
    }

    /// Hits / (hits + misses), 0.0 before any lookup.
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Total cache lookups observed (hits + misses).
    #[must_use]
    pub fn cache_lookups(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed) + self.cache_misses.load(Ordering::Relaxed)
    }

    /// Number of records currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Statistics over records whose completion falls within the trailing
    /// `window`. Returns defaults (all zero) when the window is empty.
    #[must_use]
    pub fn summary(&self, window: Duration) -> OpsSummary {
        let now = Instant::now();
        let records = self.records.lock();

        let mut latencies: Vec<Duration> = Vec::new();
        let mut successes = 0usize;
        for record in records.iter() {
            if now.duration_since(record.completed_at) > window {
                continue;
            }
            latencies.push(record.latency());
            if record.outcome == OpOutcome::Success {
                successes += 1;
            }
        }
        drop(records);

        let count = latencies.len();
        if count == 0 {
            return OpsSummary::default();
        }

        latencies.sort_unstable();
        let total: Duration = latencies.iter().sum();

        OpsSummary {
            avg_latency: total / count as u32,
            p50: percentile(&latencies, 50.0),
            p95: percentile(&latencies, 95.0),
            p99: percentile(&latencies, 99.0),
            success_rate: successes as f64 / count as f64,
            throughput_per_sec: count as f64 / window.as_secs_f64().max(f64::EPSILON),
            sample_count: count,
        }
    }

    /// Register a callback fired on threshold breaches (with cooldown).
    pub fn on_alert(&self, callback: impl Fn(&Alert) + Send + Sync + 'static) {
        self.callbacks.lock().push(Box::new(callback));
    }

    fn maybe_alert(&self) {
        if self.callbacks.lock().is_empty() {
            return;
        }

        let summary = self.summary(self.alert_config.eval_window);
        if summary.sample_count < self.alert_config.min_samples {
            return;
        }

        let alert = if summary.p95 > self.alert_config.p95_threshold {
            Alert::HighLatency {
                p95: summary.p95,
                threshold: self.alert_config.p95_threshold,
            }
        } else if summary.success_rate < self.alert_config.min_success_rate {
            Alert::LowSuccessRate {
                rate: summary.success_rate,
                threshold: self.alert_config.min_success_rate,
            }
        } else {
            return;
        };

        {
            let mut last = self.last_alert_at.lock();
            let now = Instant::now();
            if let Some(at) = *last {
                if now.duration_since(at) < self.alert_config.cooldown {
                    return;
                }
            }
            *last = Some(now);
        }

        warn!(%alert, "Gateway health threshold crossed");
        counter!("datastore_gateway_alerts_total").increment(1);
        for callback in self.callbacks.lock().iter() {
            // A misbehaving callback must not take recording down with it
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&alert);
            }));
            if result.is_err() {
                warn!("Alert callback panicked");
            }
        }
    }
}

/// Nearest-rank percentile over sorted latencies.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Record a budget-gate denial (no remote call was attempted).
pub(crate) fn record_budget_denied(class: OpClass) {
    counter!(
        "datastore_gateway_budget_denied_total",
        "class" => class.label()
    )
    .increment(1);
}

/// Record an eviction sweep (called from the cache).
pub(crate) fn record_eviction(count: usize, bytes: usize) {
    counter!("datastore_gateway_evictions_total").increment(count as u64);
    counter!("datastore_gateway_evicted_bytes_total").increment(bytes as u64);
}

/// Publish cache occupancy gauges (called from the snapshot path).
pub(crate) fn set_cache_gauges(entries: usize, bytes: usize) {
    gauge!("datastore_gateway_cache_entries").set(entries as f64);
    gauge!("datastore_gateway_cache_bytes").set(bytes as f64);
}

/// Publish remaining budget per class.
pub(crate) fn set_budget_gauge(class: OpClass, remaining: u32) {
    gauge!(
        "datastore_gateway_budget_remaining",
        "class" => class.label()
    )
    .set(f64::from(remaining));
}
