//! Site preference records
//!
//! Records live in extension storage keyed by hostname. Two layouts exist in
//! the wild and both stay readable:
//!
//! - V2: `{ profiles: [...], settings: { dontShowAgain, preferredCookieStoreId, defaultProfileId } }`
//! - V1: `{ dontShowAgain, cookieStoreId }` directly on the record
//!
//! No migration is ever written back. Every consumer goes through
//! [`SiteRecord::preference`], the single place that knows both layouts.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::HostError;
use crate::types::CookieStoreId;

/// Storage key of the singleton global settings record.
pub const GLOBAL_SETTINGS_KEY: &str = "globalSettings";

/// Does this storage key name a site record?
pub fn is_site_key(key: &str) -> bool {
    key != GLOBAL_SETTINGS_KEY && key.contains('.')
}

// =============================================================================
// Global Settings
// =============================================================================

/// Extension-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default = "default_language")]
    pub language: String,
    /// Prompt on sites that have no record yet
    #[serde(default = "default_intercept_all")]
    pub intercept_all: bool,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_intercept_all() -> bool {
    true
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            language: default_language(),
            intercept_all: default_intercept_all(),
        }
    }
}

impl GlobalSettings {
    /// Decode the stored value, falling back to defaults when missing or malformed.
    pub fn from_stored(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::default(),
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed global settings: {e}");
                Self::default()
            }),
        }
    }
}

// =============================================================================
// Site Record
// =============================================================================

/// A named shortcut to a container for one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub cookie_store_id: CookieStoreId,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
}

/// The V2 `settings` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub dont_show_again: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub preferred_cookie_store_id: Option<CookieStoreId>,
    /// `None` when the key is absent, `Some(None)` for an explicit `null`
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "explicit_null")]
    pub default_profile_id: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SiteSettings {
    pub fn default_profile_id(&self) -> Option<&str> {
        self.default_profile_id.as_ref().and_then(|id| id.as_deref())
    }
}

/// Per-hostname record as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    #[serde(default, deserialize_with = "readable_profiles")]
    pub profiles: Vec<Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub settings: Option<SiteSettings>,
    /// V1 flag
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub dont_show_again: Option<bool>,
    /// V1 target
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub cookie_store_id: Option<CookieStoreId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Which layout carries the routing preference of a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schema<'a> {
    V2(&'a SiteSettings),
    V1 {
        dont_show_again: bool,
        cookie_store_id: Option<&'a CookieStoreId>,
    },
    Unconfigured,
}

/// Canonical routing preference of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitePreference {
    /// Skip the chooser and open in this container
    AlwaysOpenIn(CookieStoreId),
    /// Show the chooser
    AskEveryTime,
}

impl SitePreference {
    pub fn target(&self) -> Option<&CookieStoreId> {
        match self {
            SitePreference::AlwaysOpenIn(id) => Some(id),
            SitePreference::AskEveryTime => None,
        }
    }
}

impl SiteRecord {
    /// Empty V2 record, as created when a site is first configured.
    pub fn new() -> Self {
        Self {
            settings: Some(SiteSettings::default()),
            ..Self::default()
        }
    }

    /// Decode a stored value. `Null` counts as absent and only a non-object
    /// is an error: unreadable fields decode as missing and unreadable
    /// profiles are skipped.
    pub fn from_stored(key: &str, value: Option<&Value>) -> Result<Option<Self>, HostError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| HostError::Decode {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    pub fn to_value(&self) -> Value {
        // Field types are plain strings, bools and maps
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Layout in effect. V2 wins whenever `settings.dontShowAgain` is present.
    pub fn schema(&self) -> Schema<'_> {
        if let Some(settings) = &self.settings {
            if settings.dont_show_again.is_some() {
                return Schema::V2(settings);
            }
        }
        match self.dont_show_again {
            Some(flag) => Schema::V1 {
                dont_show_again: flag,
                cookie_store_id: self.cookie_store_id.as_ref(),
            },
            None => Schema::Unconfigured,
        }
    }

    /// Resolve the routing preference. Opting in is explicit: a record with
    /// profiles but no flag still asks every time.
    pub fn preference(&self) -> SitePreference {
        let target = match self.schema() {
            Schema::V2(settings) if settings.dont_show_again == Some(true) => {
                match non_empty(settings.preferred_cookie_store_id.as_ref()) {
                    Some(id) => Some(id),
                    None => settings
                        .default_profile_id()
                        .filter(|id| !id.is_empty())
                        .and_then(|id| self.profile(id))
                        .and_then(|profile| non_empty(Some(&profile.cookie_store_id))),
                }
            }
            Schema::V1 {
                dont_show_again: true,
                cookie_store_id,
            } => non_empty(cookie_store_id),
            _ => None,
        };

        match target {
            Some(id) => SitePreference::AlwaysOpenIn(id.clone()),
            None => SitePreference::AskEveryTime,
        }
    }

    /// Is the chooser suppressed for this site (the V2 exception flag)?
    pub fn is_exception(&self) -> bool {
        self.settings
            .as_ref()
            .is_some_and(|settings| settings.dont_show_again == Some(true))
    }

    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    /// Record "always open this site in `cookie_store_id`".
    pub fn remember(&mut self, cookie_store_id: CookieStoreId, profile_id: Option<String>) {
        let settings = self.settings.get_or_insert_with(SiteSettings::default);
        settings.dont_show_again = Some(true);
        settings.preferred_cookie_store_id = Some(cookie_store_id);
        settings.default_profile_id = Some(profile_id.filter(|id| !id.is_empty()));
    }

    /// Show the chooser again on the next visit.
    pub fn forget(&mut self) {
        let settings = self.settings.get_or_insert_with(SiteSettings::default);
        settings.dont_show_again = Some(false);
    }
}

/// A field of the wrong type reads as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer).map(Some)
}

fn readable_profiles<'de, D>(deserializer: D) -> Result<Vec<Profile>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(profile) => Some(profile),
            Err(e) => {
                log::warn!("Skipping unreadable profile: {e}");
                None
            }
        })
        .collect())
}

fn non_empty(id: Option<&CookieStoreId>) -> Option<&CookieStoreId> {
    id.filter(|id| !id.as_str().is_empty())
}
