//! Composite store keys.
//!
//! A [`StoreKey`] addresses one value in the remote store: store name, scope,
//! and key name. Validation happens once at the gateway boundary so the rest
//! of the crate can assume well-formed keys.
//!
//! # Example
//!
//! ```
//! use datastore_gateway::StoreKey;
//!
//! let key = StoreKey::new("PlayerData", "global", "player_1234").unwrap();
//! assert_eq!(key.canonical(), "PlayerData/global/player_1234");
//!
//! // Scope defaults to "global"
//! let key = StoreKey::unscoped("PlayerData", "player_1234").unwrap();
//! assert_eq!(key.scope(), "global");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Longest allowed component (store name, scope, or key name).
pub const MAX_COMPONENT_LEN: usize = 50;

/// A validated (store, scope, name) triple.
///
/// The canonical rendering `store/scope/name` is used as the cache key;
/// `store/scope/` is the bulk-invalidation prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    store: String,
    scope: String,
    name: String,
}

impl StoreKey {
    /// Build a key, validating each component.
    ///
    /// # Errors
    ///
    /// `InvalidKey` when any component is empty, longer than
    /// [`MAX_COMPONENT_LEN`], or contains control characters.
    pub fn new(
        store: impl Into<String>,
        scope: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let store = store.into();
        let scope = scope.into();
        let name = name.into();

        validate_component("store name", &store)?;
        validate_component("scope", &scope)?;
        validate_component("key name", &name)?;

        Ok(Self { store, scope, name })
    }

    /// Build a key in the default `global` scope.
    pub fn unscoped(
        store: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        Self::new(store, "global", name)
    }

    #[must_use]
    pub fn store(&self) -> &str {
        &self.store
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical rendering, used as the cache key.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}/{}/{}", self.store, self.scope, self.name)
    }

    /// Prefix shared by every key in this key's store + scope.
    #[must_use]
    pub fn scope_prefix(&self) -> String {
        prefix_for(&self.store, &self.scope)
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.store, self.scope, self.name)
    }
}

/// Invalidation prefix for a whole store + scope.
#[must_use]
pub fn prefix_for(store: &str, scope: &str) -> String {
    format!("{}/{}/", store, scope)
}

/// Validate a store + scope pair for listing operations, which address a
/// whole scope rather than one key.
pub(crate) fn validate_listing(store: &str, scope: &str) -> Result<(), GatewayError> {
    validate_component("store name", store)?;
    validate_component("scope", scope)
}

fn validate_component(what: &str, value: &str) -> Result<(), GatewayError> {
    if value.is_empty() {
        return Err(GatewayError::InvalidKey(format!("{what} is empty")));
    }
    if value.len() > MAX_COMPONENT_LEN {
        return Err(GatewayError::InvalidKey(format!(
            "{what} is {} bytes, limit is {MAX_COMPONENT_LEN}",
            value.len()
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(GatewayError::InvalidKey(format!(
            "{what} contains control characters"
        )));
    }
    Ok(())
}
