use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::traits::{KeyPage, RemoteStore, VersionedValue};
use crate::error::{GatewayError, MAX_VALUE_BYTES};
use crate::key::{prefix_for, StoreKey};

struct StoredRecord {
    value: Value,
    version: u64,
}

/// In-process [`RemoteStore`] used by tests, demos, and as the reference
/// implementation of the backend contract. Enforces the same payload ceiling
/// a real backend would and assigns monotonic version tokens per key.
pub struct InMemoryStore {
    data: DashMap<String, StoredRecord>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Current item count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all items
    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn format_version(n: u64) -> String {
    format!("v{n}")
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<VersionedValue>, GatewayError> {
        Ok(self.data.get(&key.canonical()).map(|r| VersionedValue {
            value: r.value.clone(),
            version: format_version(r.version),
        }))
    }

    async fn set(&self, key: &StoreKey, value: &Value) -> Result<String, GatewayError> {
        let size = value.to_string().len();
        if size > MAX_VALUE_BYTES {
            return Err(GatewayError::PayloadTooLarge { size });
        }

        let version = match self.data.entry(key.canonical()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                record.value = value.clone();
                record.version += 1;
                record.version
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(StoredRecord {
                    value: value.clone(),
                    version: 1,
                });
                1
            }
        };

        Ok(format_version(version))
    }

    async fn delete(&self, key: &StoreKey) -> Result<bool, GatewayError> {
        Ok(self.data.remove(&key.canonical()).is_some())
    }

    async fn list_keys(
        &self,
        store: &str,
        scope: &str,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<KeyPage, GatewayError> {
        let offset: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| GatewayError::Backend(format!("invalid page token: {token}")))?,
            None => 0,
        };

        let prefix = prefix_for(store, scope);
        let mut names: Vec<String> = self
            .data
            .iter()
            .filter_map(|e| e.key().strip_prefix(&prefix).map(str::to_string))
            .collect();
        names.sort_unstable();

        let page: Vec<String> = names.iter().skip(offset).take(page_size).cloned().collect();
        let next_offset = offset + page.len();
        let next_page_token = if next_offset < names.len() {
            Some(next_offset.to_string())
        } else {
            None
        };

        Ok(KeyPage {
            keys: page,
            next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(name: &str) -> StoreKey {
        StoreKey::new("TestStore", "global", name).unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = InMemoryStore::new();
        let result = store.get(&key("nope")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryStore::new();
        let version = store.set(&key("k1"), &json!({"hp": 10})).await.unwrap();
        assert_eq!(version, "v1");

        let fetched = store.get(&key("k1")).await.unwrap().unwrap();
        assert_eq!(fetched.value["hp"], 10);
        assert_eq!(fetched.version, "v1");
    }

    #[tokio::test]
    async fn test_version_increments_per_write() {
        let store = InMemoryStore::new();
        assert_eq!(store.set(&key("k"), &json!(1)).await.unwrap(), "v1");
        assert_eq!(store.set(&key("k"), &json!(2)).await.unwrap(), "v2");
        assert_eq!(store.set(&key("k"), &json!(3)).await.unwrap(), "v3");

        let fetched = store.get(&key("k")).await.unwrap().unwrap();
        assert_eq!(fetched.value, json!(3));
        assert_eq!(fetched.version, "v3");
    }

    #[tokio::test]
    async fn test_versions_independent_per_key() {
        let store = InMemoryStore::new();
        store.set(&key("a"), &json!(1)).await.unwrap();
        store.set(&key("a"), &json!(2)).await.unwrap();
        let version = store.set(&key("b"), &json!(1)).await.unwrap();
        assert_eq!(version, "v1");
    }

    #[tokio::test]
    async fn test_payload_ceiling_enforced() {
        let store = InMemoryStore::new();
        let oversized = json!({"data": "x".repeat(MAX_VALUE_BYTES)});

        let result = store.set(&key("big"), &oversized).await;
        assert!(matches!(
            result,
            Err(GatewayError::PayloadTooLarge { size }) if size > MAX_VALUE_BYTES
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = InMemoryStore::new();
        store.set(&key("k"), &json!(1)).await.unwrap();

        assert!(store.delete(&key("k")).await.unwrap());
        assert!(!store.delete(&key("k")).await.unwrap());
        assert!(store.get(&key("k")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_keys_sorted_and_scoped() {
        let store = InMemoryStore::new();
        store.set(&key("banana"), &json!(1)).await.unwrap();
        store.set(&key("apple"), &json!(2)).await.unwrap();
        let other = StoreKey::new("OtherStore", "global", "cherry").unwrap();
        store.set(&other, &json!(3)).await.unwrap();

        let page = store
            .list_keys("TestStore", "global", None, 100)
            .await
            .unwrap();
        assert_eq!(page.keys, vec!["apple", "banana"]);
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_list_keys_pagination() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.set(&key(&format!("k{i}")), &json!(i)).await.unwrap();
        }

        let page1 = store
            .list_keys("TestStore", "global", None, 2)
            .await
            .unwrap();
        assert_eq!(page1.keys, vec!["k0", "k1"]);
        let token1 = page1.next_page_token.expect("more pages");

        let page2 = store
            .list_keys("TestStore", "global", Some(&token1), 2)
            .await
            .unwrap();
        assert_eq!(page2.keys, vec!["k2", "k3"]);
        let token2 = page2.next_page_token.expect("more pages");

        let page3 = store
            .list_keys("TestStore", "global", Some(&token2), 2)
            .await
            .unwrap();
        assert_eq!(page3.keys, vec!["k4"]);
        assert!(page3.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_list_keys_bad_token() {
        let store = InMemoryStore::new();
        let result = store
            .list_keys("TestStore", "global", Some("not-a-token"), 10)
            .await;
        assert!(matches!(result, Err(GatewayError::Backend(_))));
    }

    #[tokio::test]
    async fn test_list_keys_empty_scope() {
        let store = InMemoryStore::new();
        let page = store.list_keys("Empty", "global", None, 10).await.unwrap();
        assert!(page.keys.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writes() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let k = key(&format!("batch{batch}-item{i}"));
                    store.set(&k, &json!({"i": i})).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
