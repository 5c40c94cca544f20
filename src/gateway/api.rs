//! Gateway operations: get, set, delete, list_keys.
//!
//! Each operation follows the same shape: cache check (reads only) →
//! budget gate → remote call under retry → metrics → cache update.
//! Budget exhaustion returns [`GatewayError::BudgetExceeded`] immediately;
//! callers choose whether to queue or back off.

use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use super::{CallOptions, StoreGateway};
use crate::budget::OpClass;
use crate::error::{GatewayError, MAX_VALUE_BYTES};
use crate::key::{self, StoreKey};
use crate::metrics::{OpOutcome, OperationRecord};
use crate::resilience::retry::run_with_retry;

impl StoreGateway {
    /// Read one value. `Ok(None)` means the backend confirmed absence; an
    /// ambiguous failure (timeout, throttle storm) is an error, never a
    /// silent not-found.
    pub async fn get(&self, key: &StoreKey) -> Result<Option<Value>, GatewayError> {
        self.get_with(key, &CallOptions::default()).await
    }

    /// [`get`](Self::get) with per-call options.
    pub async fn get_with(
        &self,
        key: &StoreKey,
        opts: &CallOptions,
    ) -> Result<Option<Value>, GatewayError> {
        let canonical = key.canonical();

        if !opts.bypass_cache {
            if let Some(hit) = self.cache.get(&canonical) {
                self.recorder.record_cache_hit();
                debug!(key = %canonical, "Cache hit");
                return Ok(Some(hit.value));
            }
            self.recorder.record_cache_miss();
        }

        if !self.budget.admit(OpClass::Read) {
            return Err(self.budget_exceeded(OpClass::Read));
        }
        self.pad_delay(opts.cancel.as_ref()).await?;

        let started_at = Instant::now();
        let outcome = run_with_retry(
            "get",
            &self.retry,
            opts.cancel.as_ref(),
            opts.deadline(),
            || self.backend.get(key),
        )
        .await;

        self.record_op(
            OpClass::Read,
            canonical.clone(),
            started_at,
            outcome.attempts,
            outcome.result.as_ref().err(),
            0,
        );

        match outcome.result {
            Ok(Some(fetched)) => {
                self.cache.put(
                    &canonical,
                    fetched.value.clone(),
                    Some(fetched.version),
                    self.config.cache_ttl(),
                );
                Ok(Some(fetched.value))
            }
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Write one value, returning the backend's new version token.
    ///
    /// The payload is validated (serialized ≤ 4 MB) before any budget is
    /// consumed. The cache entry is invalidated, not updated: the backend
    /// assigns the authoritative version, so the next read re-fetches.
    pub async fn set(&self, key: &StoreKey, value: Value) -> Result<String, GatewayError> {
        self.set_with(key, value, &CallOptions::default()).await
    }

    /// [`set`](Self::set) with per-call options.
    pub async fn set_with(
        &self,
        key: &StoreKey,
        value: Value,
        opts: &CallOptions,
    ) -> Result<String, GatewayError> {
        let canonical = key.canonical();

        let payload_bytes = value.to_string().len();
        if payload_bytes > MAX_VALUE_BYTES {
            return Err(GatewayError::PayloadTooLarge {
                size: payload_bytes,
            });
        }

        if !self.budget.admit(OpClass::Write) {
            return Err(self.budget_exceeded(OpClass::Write));
        }

        // Invalidate before the call goes out: a reader racing the in-flight
        // write must miss and re-fetch, never see the pre-write value.
        self.cache.invalidate(&canonical);

        self.pad_delay(opts.cancel.as_ref()).await?;

        let started_at = Instant::now();
        let outcome = run_with_retry(
            "set",
            &self.retry,
            opts.cancel.as_ref(),
            opts.deadline(),
            || self.backend.set(key, &value),
        )
        .await;

        self.record_op(
            OpClass::Write,
            canonical,
            started_at,
            outcome.attempts,
            outcome.result.as_ref().err(),
            payload_bytes,
        );

        outcome.result
    }

    /// Delete one key. Returns whether the backend reported it existed.
    ///
    /// The cache entry is invalidated unconditionally; even a "not found"
    /// from the backend leaves the key absent, which is the same net state.
    pub async fn delete(&self, key: &StoreKey) -> Result<bool, GatewayError> {
        self.delete_with(key, &CallOptions::default()).await
    }

    /// [`delete`](Self::delete) with per-call options.
    pub async fn delete_with(
        &self,
        key: &StoreKey,
        opts: &CallOptions,
    ) -> Result<bool, GatewayError> {
        let canonical = key.canonical();

        if !self.budget.admit(OpClass::Delete) {
            return Err(self.budget_exceeded(OpClass::Delete));
        }

        self.cache.invalidate(&canonical);

        self.pad_delay(opts.cancel.as_ref()).await?;

        let started_at = Instant::now();
        let outcome = run_with_retry(
            "delete",
            &self.retry,
            opts.cancel.as_ref(),
            opts.deadline(),
            || self.backend.delete(key),
        )
        .await;

        self.record_op(
            OpClass::Delete,
            canonical,
            started_at,
            outcome.attempts,
            outcome.result.as_ref().err(),
            0,
        );

        outcome.result
    }

    /// List key names in a store + scope, one page at a time.
    ///
    /// Never cached: listings are too volatile and too large to cache
    /// safely. Pass the returned token back to fetch the next page.
    pub async fn list_keys(
        &self,
        store: &str,
        scope: &str,
        page_token: Option<&str>,
    ) -> Result<crate::backend::traits::KeyPage, GatewayError> {
        self.list_keys_with(store, scope, page_token, &CallOptions::default())
            .await
    }

    /// [`list_keys`](Self::list_keys) with per-call options.
    pub async fn list_keys_with(
        &self,
        store: &str,
        scope: &str,
        page_token: Option<&str>,
        opts: &CallOptions,
    ) -> Result<crate::backend::traits::KeyPage, GatewayError> {
        key::validate_listing(store, scope)?;

        if !self.budget.admit(OpClass::List) {
            return Err(self.budget_exceeded(OpClass::List));
        }

        self.pad_delay(opts.cancel.as_ref()).await?;

        let page_size = self.config.list_page_size;
        let started_at = Instant::now();
        let outcome = run_with_retry(
            "list_keys",
            &self.retry,
            opts.cancel.as_ref(),
            opts.deadline(),
            || self.backend.list_keys(store, scope, page_token, page_size),
        )
        .await;

        self.record_op(
            OpClass::List,
            key::prefix_for(store, scope),
            started_at,
            outcome.attempts,
            outcome.result.as_ref().err(),
            0,
        );

        outcome.result
    }

    fn record_op(
        &self,
        class: OpClass,
        key: String,
        started_at: Instant,
        attempts: u32,
        error: Option<&GatewayError>,
        payload_bytes: usize,
    ) {
        // Cancelled before the first attempt: no round-trip to record
        if attempts == 0 {
            return;
        }
        let outcome = match error {
            None => OpOutcome::Success,
            Some(GatewayError::Throttled(_)) => OpOutcome::Throttled,
            Some(GatewayError::RetryExhausted { source, .. })
                if matches!(**source, GatewayError::Throttled(_)) =>
            {
                OpOutcome::Throttled
            }
            Some(_) => OpOutcome::Failure,
        };

        self.recorder.record(OperationRecord {
            class,
            key,
            started_at,
            completed_at: Instant::now(),
            attempts,
            outcome,
            payload_bytes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryStore;
    use crate::backend::traits::{KeyPage, RemoteStore, VersionedValue};
    use crate::config::GatewayConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Delegating store that counts remote calls per operation.
    struct CountingStore {
        inner: InMemoryStore,
        gets: AtomicU32,
        sets: AtomicU32,
        deletes: AtomicU32,
        lists: AtomicU32,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(),
                gets: AtomicU32::new(0),
                sets: AtomicU32::new(0),
                deletes: AtomicU32::new(0),
                lists: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteStore for CountingStore {
        async fn get(&self, key: &StoreKey) -> Result<Option<VersionedValue>, GatewayError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn set(&self, key: &StoreKey, value: &Value) -> Result<String, GatewayError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &StoreKey) -> Result<bool, GatewayError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(key).await
        }

        async fn list_keys(
            &self,
            store: &str,
            scope: &str,
            page_token: Option<&str>,
            page_size: usize,
        ) -> Result<KeyPage, GatewayError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list_keys(store, scope, page_token, page_size).await
        }
    }

    fn gateway_with(config: GatewayConfig) -> (StoreGateway, Arc<CountingStore>) {
        let store = Arc::new(CountingStore::new());
        (StoreGateway::new(config, store.clone()), store)
    }

    fn k(name: &str) -> StoreKey {
        StoreKey::unscoped("TestStore", name).unwrap()
    }

    #[tokio::test]
    async fn test_get_miss_fetches_and_caches() {
        let (gw, store) = gateway_with(GatewayConfig::default());
        let key = k("k1");

        gw.set(&key, json!({"hp": 7})).await.unwrap();
        assert_eq!(store.sets.load(Ordering::SeqCst), 1);

        // First read: remote fetch
        let v1 = gw.get(&key).await.unwrap().unwrap();
        assert_eq!(v1["hp"], 7);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);

        // Second read: served from cache, no remote call
        let v2 = gw.get(&key).await.unwrap().unwrap();
        assert_eq!(v2, v1);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_absent_is_ok_none() {
        let (gw, _) = gateway_with(GatewayConfig::default());
        let result = gw.get(&k("missing")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_absent_reads_are_not_negatively_cached() {
        let (gw, store) = gateway_with(GatewayConfig::default());
        let key = k("late");

        assert!(gw.get(&key).await.unwrap().is_none());
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);

        // A second read goes to the backend again
        assert!(gw.get(&key).await.unwrap().is_none());
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_invalidates_then_next_read_refetches() {
        let (gw, store) = gateway_with(GatewayConfig::default());
        let key = k("k");

        gw.set(&key, json!({"v": 1})).await.unwrap();
        let _ = gw.get(&key).await.unwrap(); // cache now warm
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);

        gw.set(&key, json!({"v": 2})).await.unwrap();

        // Cache was invalidated by the write: fresh remote fetch
        let fetched = gw.get(&key).await.unwrap().unwrap();
        assert_eq!(fetched["v"], 2);
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_returns_version_token() {
        let (gw, _) = gateway_with(GatewayConfig::default());
        let key = k("k");

        assert_eq!(gw.set(&key, json!(1)).await.unwrap(), "v1");
        assert_eq!(gw.set(&key, json!(2)).await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_before_budget() {
        let (gw, store) = gateway_with(GatewayConfig::default());
        let before = gw.budget_remaining(OpClass::Write);

        let oversized = json!({"data": "x".repeat(MAX_VALUE_BYTES)});
        let result = gw.set(&k("big"), oversized).await;

        assert!(matches!(
            result,
            Err(GatewayError::PayloadTooLarge { .. })
        ));
        // No budget consumed, no remote call made
        assert_eq!(gw.budget_remaining(OpClass::Write), before);
        assert_eq!(store.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_invalidates_and_reports_existence() {
        let (gw, store) = gateway_with(GatewayConfig::default());
        let key = k("k");

        gw.set(&key, json!(1)).await.unwrap();
        let _ = gw.get(&key).await.unwrap(); // warm cache

        assert!(gw.delete(&key).await.unwrap());
        assert!(!gw.delete(&key).await.unwrap());
        assert_eq!(store.deletes.load(Ordering::SeqCst), 2);

        // Cache entry gone: read goes remote and confirms absence
        let gets_before = store.gets.load(Ordering::SeqCst);
        assert!(gw.get(&key).await.unwrap().is_none());
        assert_eq!(store.gets.load(Ordering::SeqCst), gets_before + 1);
    }

    #[tokio::test]
    async fn test_read_budget_exhaustion() {
        let config = GatewayConfig {
            budget_per_window: 2,
            read_window_secs: 60,
            ..Default::default()
        };
        let (gw, store) = gateway_with(config);

        // Distinct keys so the cache can't shield the budget
        assert!(gw.get(&k("a")).await.unwrap().is_none());
        assert!(gw.get(&k("b")).await.unwrap().is_none());

        let err = gw.get(&k("c")).await.unwrap_err();
        match err {
            GatewayError::BudgetExceeded { class, retry_after } => {
                assert_eq!(class, OpClass::Read);
                assert!(retry_after <= std::time::Duration::from_secs(60));
            }
            other => panic!("expected BudgetExceeded, got {other:?}"),
        }
        // Third call never reached the backend
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_hits_do_not_consume_budget() {
        let config = GatewayConfig {
            budget_per_window: 2,
            read_window_secs: 60,
            ..Default::default()
        };
        let (gw, store) = gateway_with(config);
        let key = k("hot");

        gw.set(&key, json!(1)).await.unwrap();

        assert!(gw.get(&key).await.unwrap().is_some()); // miss: budget 2→1
        for _ in 0..50 {
            assert!(gw.get(&key).await.unwrap().is_some()); // hits
        }

        assert_eq!(gw.budget_remaining(OpClass::Read), 1);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_classes_gate_independently() {
        let config = GatewayConfig {
            budget_per_window: 1,
            read_window_secs: 60,
            write_window_secs: 60,
            delete_window_secs: 60,
            list_window_secs: 60,
            ..Default::default()
        };
        let (gw, _) = gateway_with(config);

        gw.set(&k("a"), json!(1)).await.unwrap();
        assert!(matches!(
            gw.set(&k("b"), json!(2)).await,
            Err(GatewayError::BudgetExceeded { class: OpClass::Write, .. })
        ));

        // Reads, deletes and listings still admitted
        assert!(gw.get(&k("a")).await.is_ok());
        assert!(gw.delete(&k("a")).await.is_ok());
        assert!(gw.list_keys("TestStore", "global", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_keys_paginates() {
        let config = GatewayConfig {
            list_page_size: 2,
            ..Default::default()
        };
        let (gw, _) = gateway_with(config);

        for name in ["a", "b", "c"] {
            gw.set(&k(name), json!(1)).await.unwrap();
        }

        let page1 = gw.list_keys("TestStore", "global", None).await.unwrap();
        assert_eq!(page1.keys, vec!["a", "b"]);
        let token = page1.next_page_token.expect("second page");

        let page2 = gw
            .list_keys("TestStore", "global", Some(&token))
            .await
            .unwrap();
        assert_eq!(page2.keys, vec!["c"]);
        assert!(page2.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_list_keys_validates_store_and_scope() {
        let (gw, store) = gateway_with(GatewayConfig::default());

        assert!(matches!(
            gw.list_keys("", "global", None).await,
            Err(GatewayError::InvalidKey(_))
        ));
        assert!(matches!(
            gw.list_keys("S", "sc\nope", None).await,
            Err(GatewayError::InvalidKey(_))
        ));
        assert_eq!(store.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bypass_cache_still_populates() {
        let (gw, store) = gateway_with(GatewayConfig::default());
        let key = k("k");
        gw.set(&key, json!(1)).await.unwrap();

        let opts = CallOptions::default().bypass_cache();
        let _ = gw.get_with(&key, &opts).await.unwrap();
        let _ = gw.get_with(&key, &opts).await.unwrap();
        // Bypass means remote every time
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);

        // Plain read now hits the populated cache
        let _ = gw.get(&key).await.unwrap();
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_operations_feed_metrics() {
        let (gw, _) = gateway_with(GatewayConfig::default());
        let key = k("k");

        gw.set(&key, json!({"v": 1})).await.unwrap();
        let _ = gw.get(&key).await.unwrap();
        let _ = gw.get(&key).await.unwrap();

        let snapshot = gw.metrics_summary();
        // set + miss-read recorded; cache hit is counter-only
        assert_eq!(snapshot.ops.sample_count, 2);
        assert_eq!(snapshot.ops.success_rate, 1.0);
        assert!(snapshot.cache_hit_rate > 0.0);
    }
}
