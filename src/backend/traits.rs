use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;
use crate::key::StoreKey;

/// A value read from the backend, with its server-assigned version token.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    pub value: Value,
    /// Opaque token; changes on every write, assigned by the backend.
    pub version: String,
}

/// One page of key names plus the continuation token for the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPage {
    pub keys: Vec<String>,
    /// `None` when this is the last page. Opaque to callers.
    pub next_page_token: Option<String>,
}

/// The remote key-value backend the gateway fronts.
///
/// Implementations signal rate-limiting with [`GatewayError::Throttled`] and
/// recoverable faults with [`GatewayError::Transient`] so the retry policy
/// can classify; anything else is treated as permanent. A missing key is
/// `Ok(None)`, never an error.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &StoreKey) -> Result<Option<VersionedValue>, GatewayError>;

    /// Write a value, returning the new version token. Must reject serialized
    /// payloads above [`crate::error::MAX_VALUE_BYTES`] with `PayloadTooLarge`.
    async fn set(&self, key: &StoreKey, value: &Value) -> Result<String, GatewayError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &StoreKey) -> Result<bool, GatewayError>;

    /// List key names in a store + scope, paginated. `page_token` is a token
    /// previously returned in [`KeyPage::next_page_token`].
    async fn list_keys(
        &self,
        store: &str,
        scope: &str,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<KeyPage, GatewayError>;
}
