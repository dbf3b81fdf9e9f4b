//! WebExtension API bindings
//!
//! Implements the cg-core collaborator traits on top of the `browser.*`
//! namespaces available to the background page.

use std::collections::HashMap;

use js_sys::{Array, Object, Promise, Reflect};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use cg_core::host::{Clock, Host, IdentityProvider, PreferenceStore, TabManager};
use cg_core::types::{Container, ContainerSpec, CookieStoreId, Tab, TabCreate, TabId};
use cg_core::HostError;

#[wasm_bindgen]
extern "C" {
    // storage.local
    #[wasm_bindgen(catch, js_namespace = ["browser", "storage", "local"], js_name = get)]
    fn storage_get(keys: &JsValue) -> Result<Promise, JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["browser", "storage", "local"], js_name = set)]
    fn storage_set(items: &JsValue) -> Result<Promise, JsValue>;

    // tabs
    #[wasm_bindgen(catch, js_namespace = ["browser", "tabs"], js_name = create)]
    fn tabs_create(props: &JsValue) -> Result<Promise, JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["browser", "tabs"], js_name = update)]
    fn tabs_update(tab_id: i32, props: &JsValue) -> Result<Promise, JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["browser", "tabs"], js_name = remove)]
    fn tabs_remove(tab_id: i32) -> Result<Promise, JsValue>;

    // contextualIdentities
    #[wasm_bindgen(catch, js_namespace = ["browser", "contextualIdentities"], js_name = create)]
    fn identities_create(details: &JsValue) -> Result<Promise, JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["browser", "contextualIdentities"], js_name = query)]
    fn identities_query(details: &JsValue) -> Result<Promise, JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["browser", "contextualIdentities"], js_name = remove)]
    fn identities_remove(cookie_store_id: &str) -> Result<Promise, JsValue>;

    // runtime
    #[wasm_bindgen(js_namespace = ["browser", "runtime"], js_name = getURL)]
    fn runtime_get_url(path: &str) -> String;
}

// =============================================================================
// Conversions
// =============================================================================

/// Human-readable text of a rejected promise or thrown value.
pub fn js_error_text(error: &JsValue) -> String {
    if let Some(err) = error.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    error.as_string().unwrap_or_else(|| format!("{error:?}"))
}

/// Serialize as plain JS objects (never `Map`).
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

pub fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, String> {
    serde_wasm_bindgen::from_value(value).map_err(|e| e.to_string())
}

async fn settle(promise: Result<Promise, JsValue>) -> Result<JsValue, String> {
    let promise = promise.map_err(|e| js_error_text(&e))?;
    JsFuture::from(promise).await.map_err(|e| js_error_text(&e))
}

// =============================================================================
// Browser Host
// =============================================================================

/// The live browser as seen from the background page.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserHost;

impl PreferenceStore for BrowserHost {
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Value>, HostError> {
        let array = Array::new();
        for key in keys {
            array.push(&JsValue::from_str(key));
        }
        let result = settle(storage_get(&array)).await.map_err(HostError::Storage)?;
        from_js(result).map_err(HostError::Storage)
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>, HostError> {
        let result = settle(storage_get(&JsValue::NULL)).await.map_err(HostError::Storage)?;
        from_js(result).map_err(HostError::Storage)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        let items = Object::new();
        let value = to_js(&value).map_err(|e| HostError::Storage(js_error_text(&e)))?;
        Reflect::set(&items, &JsValue::from_str(key), &value).map_err(|e| HostError::Storage(js_error_text(&e)))?;
        settle(storage_set(&items)).await.map_err(HostError::Storage)?;
        Ok(())
    }
}

impl IdentityProvider for BrowserHost {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<Container, HostError> {
        let details = to_js(spec).map_err(|e| HostError::Identity(js_error_text(&e)))?;
        let created = settle(identities_create(&details)).await.map_err(HostError::Identity)?;
        from_js(created).map_err(HostError::Identity)
    }

    async fn query_containers(&self) -> Result<Vec<Container>, HostError> {
        let found = settle(identities_query(&Object::new())).await.map_err(HostError::Identity)?;
        from_js(found).map_err(HostError::Identity)
    }

    async fn remove_container(&self, id: &CookieStoreId) -> Result<(), HostError> {
        settle(identities_remove(id.as_str()))
            .await
            .map_err(|e| HostError::UnknownContainer(format!("{id}: {e}")))?;
        Ok(())
    }
}

impl TabManager for BrowserHost {
    async fn create_tab(&self, props: &TabCreate) -> Result<Tab, HostError> {
        let props = to_js(props).map_err(|e| HostError::Tab(js_error_text(&e)))?;
        let tab = settle(tabs_create(&props)).await.map_err(HostError::Tab)?;
        from_js(tab).map_err(HostError::Tab)
    }

    async fn update_tab(&self, tab_id: TabId, url: &str) -> Result<(), HostError> {
        let props = Object::new();
        Reflect::set(&props, &"url".into(), &JsValue::from_str(url)).map_err(|e| HostError::Tab(js_error_text(&e)))?;
        settle(tabs_update(tab_id, &props)).await.map_err(HostError::Tab)?;
        Ok(())
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        settle(tabs_remove(tab_id)).await.map_err(HostError::Tab)?;
        Ok(())
    }
}

impl Clock for BrowserHost {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}

impl Host for BrowserHost {
    fn extension_base(&self) -> String {
        runtime_get_url("")
    }
}
