//! ContainerGate Core Library
//!
//! This crate provides the navigation interception engine for the ContainerGate
//! browser extension. It decides, once per top-level navigation, whether the
//! request proceeds, is rerouted into another container, or is sent to the
//! chooser page.
//!
//! # Architecture
//!
//! The engine never talks to the browser directly. Storage, tabs, contextual
//! identities and time are reached through the collaborator traits in `host`,
//! so every decision can be exercised against an in-memory fake.
//!
//! # Modules
//!
//! - `types`: Shared type definitions (tab ids, request masks, decisions)
//! - `url`: URL helpers and the chooser page URL contract
//! - `prefs`: Site preference record schema (V1 and V2) and normalization
//! - `search`: Built-in search engine exclusion
//! - `whitelist`: Transient whitelist and guest session registry
//! - `host`: Collaborator traits implemented by the embedding
//! - `interceptor`: Ordered decision rules for `onBeforeRequest`
//! - `router`: Chooser completion, tab lifecycle and context menu handling
//! - `sites`: Settings operations behind the popup

pub mod error;
pub mod host;
pub mod interceptor;
pub mod prefs;
pub mod router;
pub mod search;
pub mod sites;
pub mod types;
pub mod url;
pub mod whitelist;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::{HostError, SitesError, ValidationError};
pub use host::{Clock, Host, IdentityProvider, PreferenceStore, TabManager};
pub use interceptor::{classify, Rule};
pub use prefs::{GlobalSettings, Profile, SitePreference, SiteRecord};
pub use router::{Background, Message, Reply, Sender};
pub use types::{CookieStoreId, Decision, NavigationRequest, RequestType, TabId};
pub use whitelist::{GuestSessions, TransientWhitelist, WhitelistCheck};
