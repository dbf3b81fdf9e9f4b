//! Core type definitions for ContainerGate
//!
//! These types mirror the shapes the WebExtension APIs hand to the
//! background page and are used throughout the interception engine.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Browser tab identifier.
pub type TabId = i32;

/// Cookie store id of the default (non-container) context.
pub const DEFAULT_COOKIE_STORE: &str = "firefox-default";

/// Opaque identifier of an isolated browsing context (a container).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieStoreId(String);

impl CookieStoreId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The default browsing context.
    pub fn default_store() -> Self {
        Self(DEFAULT_COOKIE_STORE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_COOKIE_STORE
    }
}

impl fmt::Display for CookieStoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CookieStoreId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CookieStoreId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestType: u8 {
        const OTHER = 1 << 0;
        const MAIN_FRAME = 1 << 1;   // main document
        const SUB_FRAME = 1 << 2;    // iframe/frame
    }
}

impl RequestType {
    /// Parse from browser request type string.
    pub fn parse(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::MAIN_FRAME,
            "sub_frame" | "subdocument" => Self::SUB_FRAME,
            _ => Self::OTHER,
        }
    }
}

// =============================================================================
// Navigation Request
// =============================================================================

/// A navigation observed by `webRequest.onBeforeRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    /// Destination URL
    pub url: String,
    /// Tab the navigation happens in
    pub tab_id: TabId,
    /// Frame ID (0 is the top-level frame)
    pub frame_id: i32,
    /// Request type
    pub request_type: RequestType,
    /// Container the requesting tab currently runs in
    pub cookie_store_id: Option<CookieStoreId>,
}

impl NavigationRequest {
    /// A top-level document load in the given tab.
    pub fn main_frame(url: impl Into<String>, tab_id: TabId, cookie_store_id: impl Into<CookieStoreId>) -> Self {
        Self {
            url: url.into(),
            tab_id,
            frame_id: 0,
            request_type: RequestType::MAIN_FRAME,
            cookie_store_id: Some(cookie_store_id.into()),
        }
    }

    /// Only top-level document loads are candidates for interception.
    pub fn is_top_level(&self) -> bool {
        self.frame_id == 0 && self.request_type.contains(RequestType::MAIN_FRAME)
    }
}

// =============================================================================
// Decision
// =============================================================================

/// Outcome of the interceptor for one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Request proceeds unmodified
    Allow,
    /// Request is redirected (to the chooser page)
    Redirect(String),
    /// Request is aborted; a replacement tab was opened separately
    Cancel,
}

impl Decision {
    /// The `webRequest.BlockingResponse` equivalent.
    pub fn to_blocking_response(&self) -> serde_json::Value {
        match self {
            Decision::Allow => serde_json::json!({}),
            Decision::Redirect(url) => serde_json::json!({ "redirectUrl": url }),
            Decision::Cancel => serde_json::json!({ "cancel": true }),
        }
    }
}

// =============================================================================
// Tabs and Containers
// =============================================================================

/// Tab descriptor as reported by the tab manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub index: u32,
    pub cookie_store_id: Option<CookieStoreId>,
}

/// Arguments for `tabs.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabCreate {
    pub url: String,
    pub cookie_store_id: CookieStoreId,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Contextual identity (container) descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub cookie_store_id: CookieStoreId,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
}

/// Arguments for `contextualIdentities.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    pub name: String,
    pub color: String,
    pub icon: String,
}
