//! Collaborator traits
//!
//! The engine only ever reaches the browser through these. The wasm crate
//! implements them over the WebExtension APIs; tests use an in-memory fake.
//! Futures are not required to be `Send`: the background page is single
//! threaded.

#![allow(async_fn_in_trait)]

use std::collections::HashMap;

use serde_json::Value;

use crate::error::HostError;
use crate::types::{Container, ContainerSpec, CookieStoreId, Tab, TabCreate, TabId};

/// Asynchronous key-value store (`storage.local`).
pub trait PreferenceStore {
    /// Fetch several keys in one round trip. Missing keys are absent from the map.
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Value>, HostError>;

    /// Every stored key.
    async fn get_all(&self) -> Result<HashMap<String, Value>, HostError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError>;

    async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
        Ok(self.get_many(&[key]).await?.remove(key))
    }
}

/// Creates and destroys containers (`contextualIdentities`).
pub trait IdentityProvider {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<Container, HostError>;

    async fn query_containers(&self) -> Result<Vec<Container>, HostError>;

    /// Fails with [`HostError::UnknownContainer`] for an id that does not exist.
    async fn remove_container(&self, id: &CookieStoreId) -> Result<(), HostError>;
}

/// Tab operations (`tabs`).
pub trait TabManager {
    async fn create_tab(&self, props: &TabCreate) -> Result<Tab, HostError>;

    async fn update_tab(&self, tab_id: TabId, url: &str) -> Result<(), HostError>;

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError>;
}

/// Wall clock in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Everything the background engine needs from its embedding.
pub trait Host: PreferenceStore + IdentityProvider + TabManager + Clock {
    /// Absolute URL of the extension root (`runtime.getURL("")`).
    fn extension_base(&self) -> String;
}
