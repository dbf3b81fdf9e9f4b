//! Settings operations behind the popup
//!
//! Reads and edits of site records, profiles, exceptions and global settings.
//! Input is validated before anything is read or written.

use crate::error::{SitesError, ValidationError};
use crate::host::{Clock, IdentityProvider, PreferenceStore};
use crate::prefs::{is_site_key, GlobalSettings, Profile, SiteRecord, GLOBAL_SETTINGS_KEY};
use crate::search::is_search_engine_domain;
use crate::types::{Container, ContainerSpec, CookieStoreId};
use crate::url::normalize_site_input;

/// Display name of the default context.
pub const NO_CONTAINER_NAME: &str = "No Container";

/// A configured site as listed in the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSummary {
    pub hostname: String,
    pub profile_count: usize,
}

/// Outcome of adding a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedSite {
    pub hostname: String,
    /// A record was written (false if the site already existed)
    pub created: bool,
    /// The site is a search engine; intercepting it prompts on every search
    pub search_engine_warning: bool,
}

/// Profile editor input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProfile {
    pub name: String,
    pub cookie_store_id: Option<CookieStoreId>,
    pub icon: Option<String>,
}

// =============================================================================
// Sites
// =============================================================================

/// Sites that have at least one profile, sorted by hostname.
pub async fn list_sites<S: PreferenceStore>(store: &S) -> Result<Vec<SiteSummary>, SitesError> {
    let all = store.get_all().await?;
    let mut sites: Vec<SiteSummary> = all
        .iter()
        .filter(|(key, _)| is_site_key(key))
        .filter_map(|(key, value)| {
            let record = SiteRecord::from_stored(key, Some(value)).ok()??;
            (!record.profiles.is_empty()).then(|| SiteSummary {
                hostname: key.clone(),
                profile_count: record.profiles.len(),
            })
        })
        .collect();
    sites.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    Ok(sites)
}

/// Sites that skip the chooser, sorted.
pub async fn list_exceptions<S: PreferenceStore>(store: &S) -> Result<Vec<String>, SitesError> {
    let all = store.get_all().await?;
    let mut hosts: Vec<String> = all
        .iter()
        .filter(|(key, _)| is_site_key(key))
        .filter(|(key, value)| {
            SiteRecord::from_stored(key, Some(value))
                .ok()
                .flatten()
                .is_some_and(|record| record.is_exception())
        })
        .map(|(key, _)| key.clone())
        .collect();
    hosts.sort();
    Ok(hosts)
}

/// Show the chooser for `hostname` again.
pub async fn clear_exception<S: PreferenceStore>(store: &S, hostname: &str) -> Result<(), SitesError> {
    let mut record = load_record(store, hostname).await?;
    record.forget();
    store.set(hostname, record.to_value()).await?;
    Ok(())
}

/// Register a site typed by the user (URL or bare hostname).
pub async fn add_site<S: PreferenceStore>(store: &S, input: &str) -> Result<AddedSite, SitesError> {
    let hostname = normalize_site_input(input).ok_or_else(|| ValidationError::InvalidUrl(input.trim().to_string()))?;
    let search_engine_warning = is_search_engine_domain(&hostname);

    let created = match store.get(&hostname).await? {
        Some(value) if !value.is_null() => false,
        _ => {
            store.set(&hostname, SiteRecord::new().to_value()).await?;
            true
        }
    };

    if search_engine_warning {
        log::warn!("{hostname} is a search engine; every search will be intercepted");
    }

    Ok(AddedSite {
        hostname,
        created,
        search_engine_warning,
    })
}

// =============================================================================
// Profiles
// =============================================================================

/// Add a profile to `hostname`, creating the record if needed.
pub async fn add_profile<S>(store: &S, hostname: &str, input: NewProfile) -> Result<Profile, SitesError>
where
    S: PreferenceStore + Clock,
{
    let name = input.name.trim();
    let Some(first) = name.chars().next() else {
        return Err(ValidationError::NameRequired.into());
    };
    let cookie_store_id = input
        .cookie_store_id
        .filter(|id| !id.as_str().is_empty())
        .ok_or(ValidationError::ContainerRequired)?;

    let icon = input
        .icon
        .map(|icon| icon.trim().to_string())
        .filter(|icon| !icon.is_empty())
        .unwrap_or_else(|| first.to_uppercase().collect());

    let now = store.now_ms();
    let profile = Profile {
        id: now.to_string(),
        name: name.to_string(),
        cookie_store_id,
        icon,
        color: profile_color(now),
    };

    let stored = store.get(hostname).await?;
    let mut record = SiteRecord::from_stored(hostname, stored.as_ref())?.unwrap_or_else(SiteRecord::new);
    record.profiles.push(profile.clone());
    store.set(hostname, record.to_value()).await?;
    Ok(profile)
}

/// Remove a profile by id. Returns whether it existed.
pub async fn delete_profile<S: PreferenceStore>(store: &S, hostname: &str, profile_id: &str) -> Result<bool, SitesError> {
    let mut record = load_record(store, hostname).await?;
    let before = record.profiles.len();
    record.profiles.retain(|profile| profile.id != profile_id);
    if record.profiles.len() == before {
        return Ok(false);
    }
    store.set(hostname, record.to_value()).await?;
    Ok(true)
}

/// Profiles configured for `hostname` (empty for unknown sites).
pub async fn profiles<S: PreferenceStore>(store: &S, hostname: &str) -> Result<Vec<Profile>, SitesError> {
    let stored = store.get(hostname).await?;
    Ok(SiteRecord::from_stored(hostname, stored.as_ref())?
        .map(|record| record.profiles)
        .unwrap_or_default())
}

/// Deterministic 24-bit color derived from a seed.
pub fn profile_color(seed: u64) -> String {
    // splitmix64 finalizer
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    format!("#{:06x}", z & 0xFF_FFFF)
}

// =============================================================================
// Global settings
// =============================================================================

pub async fn load_global_settings<S: PreferenceStore>(store: &S) -> Result<GlobalSettings, SitesError> {
    let stored = store.get(GLOBAL_SETTINGS_KEY).await?;
    Ok(GlobalSettings::from_stored(stored.as_ref()))
}

pub async fn save_global_settings<S: PreferenceStore>(store: &S, settings: &GlobalSettings) -> Result<(), SitesError> {
    let value = serde_json::to_value(settings).map_err(|e| crate::error::HostError::Storage(e.to_string()))?;
    store.set(GLOBAL_SETTINGS_KEY, value).await?;
    Ok(())
}

// =============================================================================
// Containers
// =============================================================================

/// Create a container from the container editor.
pub async fn create_container<I: IdentityProvider>(
    identity: &I,
    name: &str,
    color: &str,
    icon: &str,
) -> Result<Container, SitesError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::NameRequired.into());
    }
    let spec = ContainerSpec {
        name: name.to_string(),
        color: color.to_string(),
        icon: icon.to_string(),
    };
    Ok(identity.create_container(&spec).await?)
}

/// Options offered by the chooser: the default context first, then every container.
pub async fn chooser_options<I: IdentityProvider>(identity: &I) -> Result<Vec<Container>, SitesError> {
    let mut options = vec![Container {
        cookie_store_id: CookieStoreId::default_store(),
        name: NO_CONTAINER_NAME.to_string(),
        color: "toolbar".to_string(),
        icon: String::new(),
    }];
    options.extend(identity.query_containers().await?);
    Ok(options)
}

/// Display name for a cookie store id.
pub fn container_name<'a>(id: &CookieStoreId, containers: &'a [Container]) -> &'a str {
    if id.is_default() {
        return NO_CONTAINER_NAME;
    }
    containers
        .iter()
        .find(|c| &c.cookie_store_id == id)
        .map_or("Unknown", |c| c.name.as_str())
}

async fn load_record<S: PreferenceStore>(store: &S, hostname: &str) -> Result<SiteRecord, SitesError> {
    let stored = store.get(hostname).await?;
    SiteRecord::from_stored(hostname, stored.as_ref())?
        .ok_or_else(|| ValidationError::UnknownSite(hostname.to_string()).into())
}
