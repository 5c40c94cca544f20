// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory TTL cache with size-bounded LRU eviction.
//!
//! Reduces redundant remote reads and absorbs bursts, trading staleness for
//! latency and budget savings. The consistency contract is read-through,
//! write-invalidate: writes remove the corresponding entry rather than
//! updating it, so the next read re-fetches the backend's authoritative
//! version.
//!
//! An entry past its `expires_at` is logically absent: it is reported as a
//! miss and lazily purged. Separately from TTL, the cache enforces byte and
//! entry ceilings by evicting least-recently-used entries first.
//!
//! # Example
//!
//! ```
//! use datastore_gateway::TtlCache;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let cache = TtlCache::new(1024 * 1024, 100);
//! cache.put("PlayerData/global/p1", json!({"level": 5}), None, Duration::from_secs(300));
//!
//! let hit = cache.get("PlayerData/global/p1").unwrap();
//! assert_eq!(hit.value["level"], 5);
//!
//! cache.invalidate("PlayerData/global/p1");
//! assert!(cache.get("PlayerData/global/p1").is_none());
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

/// A cached value together with the backend version token it was read with.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub value: Value,
    pub version: Option<String>,
}

struct CacheSlot {
    value: Value,
    version: Option<String>,
    expires_at: Instant,
    /// LRU stamp from the cache's logical clock.
    last_access: AtomicU64,
    size_bytes: usize,
}

/// TTL + LRU cache keyed by canonical key strings.
///
/// All operations are synchronous and non-suspending; the byte ceiling is an
/// atomic so the adaptive controller can resize it at runtime.
pub struct TtlCache {
    entries: DashMap<String, CacheSlot>,
    bytes_used: AtomicUsize,
    max_bytes: AtomicUsize,
    max_entries: usize,
    clock: AtomicU64,
}

impl TtlCache {
    #[must_use]
    pub fn new(max_bytes: usize, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            bytes_used: AtomicUsize::new(0),
            max_bytes: AtomicUsize::new(max_bytes),
            max_entries,
            clock: AtomicU64::new(0),
        }
    }

    /// Look up a key. Expired entries count as a miss and are purged.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let expired = {
            let slot = self.entries.get(key)?;
            if slot.expires_at <= Instant::now() {
                true
            } else {
                let stamp = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
                slot.last_access.store(stamp, Ordering::Relaxed);
                return Some(CachedValue {
                    value: slot.value.clone(),
                    version: slot.version.clone(),
                });
            }
        };
        // Guard dropped before mutating the map
        if expired {
            self.remove_entry(key);
        }
        None
    }

    /// Insert or overwrite an entry. Overwriting resets the TTL.
    pub fn put(&self, key: &str, value: Value, version: Option<String>, ttl: Duration) {
        let size_bytes = approximate_size(key, &value);
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed) + 1;

        let slot = CacheSlot {
            value,
            version,
            expires_at: Instant::now() + ttl,
            last_access: AtomicU64::new(stamp),
            size_bytes,
        };

        if let Some(old) = self.entries.insert(key.to_string(), slot) {
            self.bytes_used.fetch_sub(old.size_bytes, Ordering::AcqRel);
        }
        self.bytes_used.fetch_add(size_bytes, Ordering::AcqRel);

        self.enforce_capacity();
    }

    /// Remove one entry immediately. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.remove_entry(key)
    }

    /// Remove every entry whose key starts with `prefix`. Returns the number
    /// removed. Used when an entire store/scope is bulk-modified.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let victims: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in &victims {
            if self.remove_entry(key) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(prefix, removed, "Bulk cache invalidation");
        }
        removed
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
        self.bytes_used.store(0, Ordering::Release);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn bytes_used(&self) -> usize {
        self.bytes_used.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes.load(Ordering::Acquire)
    }

    /// Adjust the byte ceiling at runtime (adaptive tuning). Shrinking below
    /// current usage triggers an eviction sweep.
    pub fn set_max_bytes(&self, max_bytes: usize) {
        self.max_bytes.store(max_bytes, Ordering::Release);
        self.enforce_capacity();
    }

    /// Fraction of the byte ceiling currently used (0.0 - 1.0+).
    #[must_use]
    pub fn fill_ratio(&self) -> f64 {
        let max = self.max_bytes();
        if max == 0 {
            return 0.0;
        }
        self.bytes_used() as f64 / max as f64
    }

    fn remove_entry(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, slot)) => {
                self.bytes_used.fetch_sub(slot.size_bytes, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// Evict least-recently-used entries until both ceilings hold.
    ///
    /// Sweep-and-sort: collect (key, stamp) pairs, oldest stamps first.
    /// Expired entries are preferred victims regardless of recency.
    fn enforce_capacity(&self) {
        if self.bytes_used() <= self.max_bytes() && self.entries.len() <= self.max_entries {
            return;
        }

        let now = Instant::now();
        let mut candidates: Vec<(String, u64, usize, bool)> = self
            .entries
            .iter()
            .map(|e| {
                (
                    e.key().clone(),
                    e.value().last_access.load(Ordering::Relaxed),
                    e.value().size_bytes,
                    e.value().expires_at <= now,
                )
            })
            .collect();

        // Expired first, then LRU by stamp
        candidates.sort_by(|a, b| b.3.cmp(&a.3).then(a.1.cmp(&b.1)));

        let mut evicted = 0usize;
        let mut evicted_bytes = 0usize;
        for (key, _, size, _) in candidates {
            if self.bytes_used() <= self.max_bytes() && self.entries.len() <= self.max_entries {
                break;
            }
            if self.remove_entry(&key) {
                evicted += 1;
                evicted_bytes += size;
            }
        }

        if evicted > 0 {
            debug!(evicted, evicted_bytes, "Cache eviction sweep");
            crate::metrics::record_eviction(evicted, evicted_bytes);
        }
    }
}

/// Approximate retained size: key + serialized value + bookkeeping overhead.
fn approximate_size(key: &str, value: &Value) -> usize {
    key.len() + value.to_string().len() + std::mem::size_of::<CacheSlot>()
}
