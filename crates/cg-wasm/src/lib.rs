//! WebAssembly bindings for ContainerGate
//!
//! The background page registers these as its listeners:
//!
//! ```js
//! browser.webRequest.onBeforeRequest.addListener(
//!     on_before_request, { urls: ["<all_urls>"], types: ["main_frame"] }, ["blocking"]);
//! browser.runtime.onMessage.addListener(on_message);
//! browser.tabs.onRemoved.addListener(on_tab_removed);
//! browser.menus.onClicked.addListener(on_menu_clicked);
//! setInterval(sweep_whitelist, sweep_interval_ms());
//! ```
//!
//! The popup uses the settings exports at the bottom of this file.

mod browser;

use std::rc::Rc;

use js_sys::{Array, Object, Reflect};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

use cg_core::router::{MENU_ITEMS, MENU_OPEN_SELECTOR};
use cg_core::sites::{self, NewProfile};
use cg_core::types::{CookieStoreId, NavigationRequest, RequestType, TabId};
use cg_core::whitelist::SWEEP_INTERVAL_MS;
use cg_core::{Background, GlobalSettings, Message, Reply, Sender};

pub use browser::BrowserHost;
use browser::{from_js, to_js};

thread_local! {
    static BACKGROUND: Rc<Background<BrowserHost>> = Rc::new(Background::new(BrowserHost));
}

fn background() -> Rc<Background<BrowserHost>> {
    BACKGROUND.with(Rc::clone)
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Debug).is_err() {
        web_sys::console::warn_1(&JsValue::from_str("ContainerGate: logger already initialized"));
    }
}

fn set(target: &Object, key: &str, value: &JsValue) {
    let _ = Reflect::set(target, &JsValue::from_str(key), value);
}

fn to_js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

// =============================================================================
// Listeners
// =============================================================================

/// `webRequest.onBeforeRequest` details, reduced to what the interceptor reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestDetails {
    url: String,
    tab_id: TabId,
    #[serde(default)]
    frame_id: i32,
    #[serde(rename = "type", default)]
    request_type: String,
    #[serde(default)]
    cookie_store_id: Option<CookieStoreId>,
}

impl From<RequestDetails> for NavigationRequest {
    fn from(details: RequestDetails) -> Self {
        NavigationRequest {
            url: details.url,
            tab_id: details.tab_id,
            frame_id: details.frame_id,
            request_type: RequestType::parse(&details.request_type),
            cookie_store_id: details.cookie_store_id,
        }
    }
}

/// Resolves to a `BlockingResponse`. Unreadable details are let through.
#[wasm_bindgen]
pub async fn on_before_request(details: JsValue) -> Result<JsValue, JsValue> {
    let request: NavigationRequest = match from_js::<RequestDetails>(details) {
        Ok(details) => details.into(),
        Err(e) => {
            log::warn!("Unreadable request details: {e}");
            return Ok(Object::new().into());
        }
    };
    let decision = background().on_before_request(&request).await;
    to_js(&decision.to_blocking_response())
}

#[wasm_bindgen]
pub async fn on_message(message: JsValue, sender: JsValue) -> Result<JsValue, JsValue> {
    let message: Message = from_js(message).map_err(to_js_error)?;
    let sender: Sender = from_js(sender).unwrap_or_default();
    match background().on_message(message, &sender).await.map_err(to_js_error)? {
        Reply::Container(container) => to_js(&container),
        Reply::None => Ok(JsValue::UNDEFINED),
    }
}

#[wasm_bindgen]
pub async fn on_tab_removed(tab_id: i32) {
    background().on_tab_removed(tab_id).await;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MenuInfo {
    menu_item_id: String,
    #[serde(default)]
    link_url: Option<String>,
    #[serde(default)]
    page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MenuTab {
    id: TabId,
}

#[wasm_bindgen]
pub async fn on_menu_clicked(info: JsValue, tab: JsValue) -> Result<(), JsValue> {
    let info: MenuInfo = from_js(info).map_err(to_js_error)?;
    let tab: MenuTab = from_js(tab).map_err(to_js_error)?;
    background()
        .on_menu_clicked(&info.menu_item_id, info.link_url.as_deref(), info.page_url.as_deref(), tab.id)
        .await
        .map_err(to_js_error)?;
    Ok(())
}

/// Periodic whitelist cleanup. Returns the number of dropped entries.
#[wasm_bindgen]
pub fn sweep_whitelist() -> u32 {
    background().sweep() as u32
}

#[wasm_bindgen]
pub fn sweep_interval_ms() -> u32 {
    SWEEP_INTERVAL_MS as u32
}

/// `[{ id, title, contexts }]` for `menus.create`.
#[wasm_bindgen]
pub fn menu_items() -> JsValue {
    let items = Array::new();
    for (id, title) in MENU_ITEMS {
        let item = Object::new();
        set(&item, "id", &JsValue::from_str(id));
        set(&item, "title", &JsValue::from_str(title));
        let contexts = Array::of2(&JsValue::from_str("page"), &JsValue::from_str("link"));
        set(&item, "contexts", &contexts);
        items.push(&item);
    }
    items.into()
}

#[wasm_bindgen]
pub fn default_menu_item() -> String {
    MENU_OPEN_SELECTOR.to_string()
}

#[wasm_bindgen]
pub fn get_session_info() -> JsValue {
    let stats = background().stats();
    let result = Object::new();
    set(&result, "whitelistedTabs", &JsValue::from(stats.whitelisted_tabs as u32));
    set(&result, "guestSessions", &JsValue::from(stats.guest_sessions as u32));
    result.into()
}

/// Chooser page URL for a destination (used by the popup's "add profile" flow).
#[wasm_bindgen]
pub fn chooser_url(target: &str, add_profile: bool) -> String {
    let bg = background();
    if add_profile {
        bg.chooser().for_new_profile(target)
    } else {
        bg.chooser().for_target(target)
    }
}

// =============================================================================
// Settings (popup)
// =============================================================================

#[wasm_bindgen]
pub async fn list_sites() -> Result<JsValue, JsValue> {
    let sites = sites::list_sites(&BrowserHost).await.map_err(to_js_error)?;
    let result = Array::new();
    for site in sites {
        let entry = Object::new();
        set(&entry, "hostname", &JsValue::from_str(&site.hostname));
        set(&entry, "profiles", &JsValue::from(site.profile_count as u32));
        result.push(&entry);
    }
    Ok(result.into())
}

#[wasm_bindgen]
pub async fn list_exceptions() -> Result<JsValue, JsValue> {
    let hosts = sites::list_exceptions(&BrowserHost).await.map_err(to_js_error)?;
    to_js(&hosts)
}

#[wasm_bindgen]
pub async fn clear_exception(hostname: String) -> Result<(), JsValue> {
    sites::clear_exception(&BrowserHost, &hostname).await.map_err(to_js_error)
}

#[wasm_bindgen]
pub async fn add_site(input: String) -> Result<JsValue, JsValue> {
    let added = sites::add_site(&BrowserHost, &input).await.map_err(to_js_error)?;
    let result = Object::new();
    set(&result, "hostname", &JsValue::from_str(&added.hostname));
    set(&result, "created", &JsValue::from(added.created));
    set(&result, "searchEngineWarning", &JsValue::from(added.search_engine_warning));
    Ok(result.into())
}

#[wasm_bindgen]
pub async fn site_profiles(hostname: String) -> Result<JsValue, JsValue> {
    let profiles = sites::profiles(&BrowserHost, &hostname).await.map_err(to_js_error)?;
    to_js(&profiles)
}

#[wasm_bindgen]
pub async fn add_profile(
    hostname: String,
    name: String,
    cookie_store_id: Option<String>,
    icon: Option<String>,
) -> Result<JsValue, JsValue> {
    let input = NewProfile {
        name,
        cookie_store_id: cookie_store_id.map(CookieStoreId::from),
        icon,
    };
    let profile = sites::add_profile(&BrowserHost, &hostname, input).await.map_err(to_js_error)?;
    to_js(&profile)
}

#[wasm_bindgen]
pub async fn delete_profile(hostname: String, profile_id: String) -> Result<bool, JsValue> {
    sites::delete_profile(&BrowserHost, &hostname, &profile_id)
        .await
        .map_err(to_js_error)
}

#[wasm_bindgen]
pub async fn load_settings() -> Result<JsValue, JsValue> {
    let settings = sites::load_global_settings(&BrowserHost).await.map_err(to_js_error)?;
    to_js(&settings)
}

#[wasm_bindgen]
pub async fn save_settings(intercept_all: bool, language: Option<String>) -> Result<(), JsValue> {
    let settings = GlobalSettings {
        language: language.unwrap_or_else(|| GlobalSettings::default().language),
        intercept_all,
    };
    sites::save_global_settings(&BrowserHost, &settings).await.map_err(to_js_error)
}

#[wasm_bindgen]
pub async fn create_container(name: String, color: String, icon: String) -> Result<JsValue, JsValue> {
    let container = sites::create_container(&BrowserHost, &name, &color, &icon)
        .await
        .map_err(to_js_error)?;
    to_js(&container)
}

#[wasm_bindgen]
pub async fn chooser_options() -> Result<JsValue, JsValue> {
    let options = sites::chooser_options(&BrowserHost).await.map_err(|e| {
        log::error!("Error fetching containers: {e}");
        to_js_error(e)
    })?;
    to_js(&options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_details_conversion() {
        let details: RequestDetails = serde_json::from_value(serde_json::json!({
            "requestId": "42",
            "url": "https://example.com/",
            "tabId": 7,
            "frameId": 0,
            "type": "main_frame",
            "cookieStoreId": "firefox-container-1",
            "method": "GET"
        }))
        .unwrap();
        let request: NavigationRequest = details.into();
        assert!(request.is_top_level());
        assert_eq!(request.tab_id, 7);
        assert_eq!(request.cookie_store_id, Some(CookieStoreId::new("firefox-container-1")));
    }

    #[test]
    fn test_menu_info() {
        let info: MenuInfo = serde_json::from_value(serde_json::json!({
            "menuItemId": "add-profile",
            "pageUrl": "https://example.com/"
        }))
        .unwrap();
        assert_eq!(info.menu_item_id, "add-profile");
        assert_eq!(info.link_url, None);
    }
}
