//! Navigation Interceptor
//!
//! Runs for every request seen by `webRequest.onBeforeRequest` and must settle
//! on exactly one [`Decision`]. The procedure is an ordered rule list; the
//! first rule that applies wins:
//!
//! 1. `SelfPage`: our own chooser page
//! 2. `NotInterceptable`: sub-resources, frames and non-web schemes
//! 3. `Whitelisted`: a live approval for this tab covers the destination
//! 4. Preference lookup (site record + global settings, one storage read):
//!    `SearchEngine`, `InterceptDisabled`, `AlreadyInContext`, `Reroute`,
//!    and finally `Chooser`
//!
//! Rules 1-3 are synchronous so the common case never waits on storage.

use log::{debug, error, warn};

use crate::host::Host;
use crate::prefs::{GlobalSettings, SitePreference, SiteRecord, GLOBAL_SETTINGS_KEY};
use crate::router::Background;
use crate::search::is_search_engine_host;
use crate::types::{CookieStoreId, Decision, NavigationRequest, TabCreate};
use crate::url::{hostname, is_web_url, ChooserUrl};
use crate::whitelist::{TransientWhitelist, WhitelistCheck};

// =============================================================================
// Rules
// =============================================================================

/// The rule that settled a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Destination is the chooser page itself
    SelfPage,
    /// Not a top-level http(s) document load
    NotInterceptable,
    /// Approved moments ago by the user
    Whitelisted,
    /// Destination has no usable hostname
    Unclassifiable,
    /// Unconfigured search engine host
    SearchEngine,
    /// Unconfigured site while "intercept all" is off
    InterceptDisabled,
    /// Site pinned to the container the tab already runs in
    AlreadyInContext,
    /// Site pinned to another container: reopen there
    Reroute(CookieStoreId),
    /// Ask the user
    Chooser,
}

impl Rule {
    /// Map the rule to the response handed back to the browser.
    pub fn decision(&self, request: &NavigationRequest, chooser: &ChooserUrl) -> Decision {
        match self {
            Rule::Reroute(_) => Decision::Cancel,
            Rule::Chooser => Decision::Redirect(chooser.for_target(&request.url)),
            _ => Decision::Allow,
        }
    }
}

/// What storage holds for the destination hostname.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteLookup {
    Missing,
    Record(SiteRecord),
    /// Present but not a record we understand
    Malformed,
}

impl SiteLookup {
    fn exists(&self) -> bool {
        !matches!(self, SiteLookup::Missing)
    }
}

/// Rules 1-3. Returns None when the storage-backed rules must decide.
pub fn prefilter(
    request: &NavigationRequest,
    chooser: &ChooserUrl,
    whitelist: &mut TransientWhitelist,
    now_ms: u64,
) -> Option<Rule> {
    if chooser.is_chooser(&request.url) {
        return Some(Rule::SelfPage);
    }

    if !request.is_top_level() || !is_web_url(&request.url) {
        return Some(Rule::NotInterceptable);
    }

    match whitelist.check(request.tab_id, &request.url, now_ms) {
        WhitelistCheck::Allowed => Some(Rule::Whitelisted),
        WhitelistCheck::Expired => {
            debug!("Dropped stale whitelist entry for tab {}", request.tab_id);
            None
        }
        WhitelistCheck::NoMatch | WhitelistCheck::Absent => None,
    }
}

/// Storage-backed rules for a destination `host`.
pub fn classify(
    host: &str,
    site: &SiteLookup,
    global: &GlobalSettings,
    current: Option<&CookieStoreId>,
) -> Rule {
    if !site.exists() {
        if is_search_engine_host(host) {
            return Rule::SearchEngine;
        }
        if !global.intercept_all {
            return Rule::InterceptDisabled;
        }
        return Rule::Chooser;
    }

    let preference = match site {
        SiteLookup::Record(record) => record.preference(),
        _ => SitePreference::AskEveryTime,
    };

    match preference {
        SitePreference::AlwaysOpenIn(target) if Some(&target) == current => Rule::AlreadyInContext,
        SitePreference::AlwaysOpenIn(target) => Rule::Reroute(target),
        SitePreference::AskEveryTime => Rule::Chooser,
    }
}

// =============================================================================
// Background: onBeforeRequest
// =============================================================================

impl<H: Host> Background<H> {
    /// Decide one navigation. Always settles; collaborator failures degrade to
    /// the chooser (lookup) or to a cancelled request (reroute).
    pub async fn on_before_request(&self, request: &NavigationRequest) -> Decision {
        let rule = self.evaluate(request).await;
        debug!("{:?} for tab {} -> {}", rule, request.tab_id, request.url);

        if let Rule::Reroute(target) = &rule {
            self.reroute(request, target).await;
        }

        rule.decision(request, self.chooser())
    }

    /// Run the rule list without side effects on tabs.
    pub async fn evaluate(&self, request: &NavigationRequest) -> Rule {
        let now = self.host().now_ms();
        let early = {
            let mut session = self.session_mut();
            prefilter(request, self.chooser(), &mut session.whitelist, now)
        };
        if let Some(rule) = early {
            return rule;
        }

        let Some(host) = hostname(&request.url) else {
            return Rule::Unclassifiable;
        };

        let mut stored = match self.host().get_many(&[host.as_str(), GLOBAL_SETTINGS_KEY]).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Storage check error: {e}");
                return Rule::Chooser;
            }
        };

        let global = GlobalSettings::from_stored(stored.get(GLOBAL_SETTINGS_KEY));
        let site = match SiteRecord::from_stored(&host, stored.remove(&host).as_ref()) {
            Ok(Some(record)) => SiteLookup::Record(record),
            Ok(None) => SiteLookup::Missing,
            Err(e) => {
                warn!("{e}");
                SiteLookup::Malformed
            }
        };

        classify(&host, &site, &global, request.cookie_store_id.as_ref())
    }

    /// Reopen the destination in `target`, then close the original tab.
    /// Creation comes first so a failure never leaves the user with neither.
    async fn reroute(&self, request: &NavigationRequest, target: &CookieStoreId) {
        let props = TabCreate {
            url: request.url.clone(),
            cookie_store_id: target.clone(),
            active: true,
            index: None,
        };

        if let Err(e) = self.host().create_tab(&props).await {
            error!("Failed to reopen {} in {}: {e}", request.url, target);
            return;
        }

        if let Err(e) = self.host().remove_tab(request.tab_id).await {
            error!("Failed to close tab {} after reroute: {e}", request.tab_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::host::Clock;
    use crate::testing::{FakeHost, HostCall};
    use crate::types::RequestType;
    use crate::url::BLANK_URL;
    use crate::whitelist::WHITELIST_TTL_MS;

    fn chooser() -> ChooserUrl {
        ChooserUrl::new(crate::testing::EXTENSION_BASE)
    }

    fn record(value: serde_json::Value) -> SiteLookup {
        SiteLookup::Record(serde_json::from_value(value).unwrap())
    }

    fn ctx(id: &str) -> CookieStoreId {
        CookieStoreId::new(id)
    }

    // -------------------------------------------------------------------------
    // Pure rules
    // -------------------------------------------------------------------------

    #[test]
    fn test_prefilter_self_page() {
        let mut wl = TransientWhitelist::new();
        let url = chooser().for_target("https://example.com/");
        let req = NavigationRequest::main_frame(url, 1, "firefox-default");
        assert_eq!(prefilter(&req, &chooser(), &mut wl, 0), Some(Rule::SelfPage));
    }

    #[test]
    fn test_prefilter_not_interceptable() {
        let mut wl = TransientWhitelist::new();
        let mut req = NavigationRequest::main_frame("https://example.com/", 1, "firefox-default");
        req.frame_id = 2;
        assert_eq!(prefilter(&req, &chooser(), &mut wl, 0), Some(Rule::NotInterceptable));

        let mut req = NavigationRequest::main_frame("https://example.com/", 1, "firefox-default");
        req.request_type = RequestType::OTHER;
        assert_eq!(prefilter(&req, &chooser(), &mut wl, 0), Some(Rule::NotInterceptable));

        let req = NavigationRequest::main_frame("ftp://example.com/", 1, "firefox-default");
        assert_eq!(prefilter(&req, &chooser(), &mut wl, 0), Some(Rule::NotInterceptable));
    }

    #[test]
    fn test_prefilter_whitelist() {
        let mut wl = TransientWhitelist::new();
        wl.approve(1, BLANK_URL, 100);
        let req = NavigationRequest::main_frame("https://example.com/", 1, "firefox-default");
        assert_eq!(prefilter(&req, &chooser(), &mut wl, 200), Some(Rule::Whitelisted));

        // Stale entries are ignored and removed
        assert_eq!(prefilter(&req, &chooser(), &mut wl, 100 + WHITELIST_TTL_MS), None);
        assert!(wl.is_empty());
    }

    #[test]
    fn test_search_engines_always_pass_when_unconfigured() {
        let global = GlobalSettings::default();
        for host in ["google.com", "www.bing.com", "duckduckgo.com", "www.Yahoo.co.uk"] {
            assert_eq!(
                classify(host, &SiteLookup::Missing, &global, None),
                Rule::SearchEngine,
                "{host}"
            );
        }
    }

    #[test]
    fn test_configured_search_engine_follows_record() {
        let site = record(json!({
            "settings": { "dontShowAgain": true, "preferredCookieStoreId": "firefox-container-2" }
        }));
        assert_eq!(
            classify("google.com", &site, &GlobalSettings::default(), Some(&ctx("firefox-default"))),
            Rule::Reroute(ctx("firefox-container-2"))
        );
    }

    #[test]
    fn test_intercept_disabled() {
        let global = GlobalSettings {
            intercept_all: false,
            ..GlobalSettings::default()
        };
        assert_eq!(classify("example.com", &SiteLookup::Missing, &global, None), Rule::InterceptDisabled);
        assert_eq!(
            classify("example.com", &SiteLookup::Missing, &GlobalSettings::default(), None),
            Rule::Chooser
        );
    }

    #[test]
    fn test_pinned_site() {
        let site = record(json!({
            "settings": { "dontShowAgain": true, "preferredCookieStoreId": "firefox-container-2" }
        }));
        let global = GlobalSettings::default();
        assert_eq!(
            classify("example.com", &site, &global, Some(&ctx("firefox-container-2"))),
            Rule::AlreadyInContext
        );
        assert_eq!(
            classify("example.com", &site, &global, Some(&ctx("firefox-default"))),
            Rule::Reroute(ctx("firefox-container-2"))
        );
        assert_eq!(classify("example.com", &site, &global, None), Rule::Reroute(ctx("firefox-container-2")));
    }

    #[test]
    fn test_record_without_opt_in_asks_even_when_intercept_off() {
        let site = record(json!({
            "profiles": [{ "id": "1", "name": "Work", "cookieStoreId": "firefox-container-1" }],
            "settings": {}
        }));
        let global = GlobalSettings {
            intercept_all: false,
            ..GlobalSettings::default()
        };
        assert_eq!(classify("example.com", &site, &global, None), Rule::Chooser);
        assert_eq!(classify("example.com", &SiteLookup::Malformed, &global, None), Rule::Chooser);
    }

    // -------------------------------------------------------------------------
    // Background::on_before_request
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unconfigured_site_redirects_to_chooser() {
        let bg = Background::new(FakeHost::new());
        let req = NavigationRequest::main_frame("https://example.com/", 1, "firefox-default");
        let decision = bg.on_before_request(&req).await;
        assert_eq!(
            decision,
            Decision::Redirect(format!(
                "{}interstitial.html?target=https%3A%2F%2Fexample.com%2F",
                crate::testing::EXTENSION_BASE
            ))
        );
        let params = bg.chooser().parse(match &decision {
            Decision::Redirect(url) => url,
            _ => unreachable!(),
        });
        assert_eq!(params.unwrap().target.as_deref(), Some("https://example.com/"));
    }

    #[tokio::test]
    async fn test_reroute_creates_then_removes() {
        let host = FakeHost::new();
        host.store(
            "example.com",
            json!({ "settings": { "dontShowAgain": true, "preferredCookieStoreId": "firefox-container-2" } }),
        );
        let bg = Background::new(host);
        let req = NavigationRequest::main_frame("https://example.com/", 3, "firefox-default");

        assert_eq!(bg.on_before_request(&req).await, Decision::Cancel);

        let calls = bg.host().tab_calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            HostCall::CreateTab(props) => {
                assert_eq!(props.url, "https://example.com/");
                assert_eq!(props.cookie_store_id, ctx("firefox-container-2"));
                assert!(props.active);
            }
            other => panic!("unexpected call {other:?}"),
        }
        assert_eq!(calls[1], HostCall::RemoveTab(3));
    }

    #[tokio::test]
    async fn test_damaged_profile_list_still_reroutes() {
        let host = FakeHost::new();
        host.store(
            "example.com",
            json!({
                "profiles": [{ "id": "1", "cookieStoreId": "firefox-container-1" }],
                "settings": { "dontShowAgain": true, "preferredCookieStoreId": "firefox-container-2" }
            }),
        );
        host.store(
            "example.org",
            json!({
                "profiles": null,
                "settings": { "dontShowAgain": true, "preferredCookieStoreId": "firefox-container-2" }
            }),
        );
        let bg = Background::new(host);

        for (tab, url) in [(3, "https://example.com/"), (4, "https://example.org/")] {
            let req = NavigationRequest::main_frame(url, tab, "firefox-default");
            assert_eq!(bg.on_before_request(&req).await, Decision::Cancel, "{url}");
            assert!(bg.host().tab_calls().contains(&HostCall::RemoveTab(tab)));
        }
    }

    #[tokio::test]
    async fn test_already_in_target_context_allows() {
        let host = FakeHost::new();
        host.store(
            "example.com",
            json!({ "settings": { "dontShowAgain": true, "preferredCookieStoreId": "firefox-container-2" } }),
        );
        let bg = Background::new(host);
        let req = NavigationRequest::main_frame("https://example.com/", 3, "firefox-container-2");
        assert_eq!(bg.on_before_request(&req).await, Decision::Allow);
        assert!(bg.host().tab_calls().is_empty());
    }

    #[tokio::test]
    async fn test_reroute_failure_keeps_original_tab() {
        let host = FakeHost::new();
        host.store("example.com", json!({ "dontShowAgain": true, "cookieStoreId": "firefox-container-2" }));
        host.fail_tab_create(true);
        let bg = Background::new(host);
        let req = NavigationRequest::main_frame("https://example.com/", 3, "firefox-default");

        assert_eq!(bg.on_before_request(&req).await, Decision::Cancel);
        assert!(!bg.host().tab_calls().contains(&HostCall::RemoveTab(3)));
    }

    #[tokio::test]
    async fn test_storage_failure_falls_back_to_chooser() {
        let host = FakeHost::new();
        host.fail_storage(true);
        let bg = Background::new(host);
        let req = NavigationRequest::main_frame("https://example.com/", 1, "firefox-default");
        assert!(matches!(bg.on_before_request(&req).await, Decision::Redirect(_)));
    }

    #[tokio::test]
    async fn test_search_engine_ignores_intercept_all() {
        let bg = Background::new(FakeHost::new());
        let req = NavigationRequest::main_frame("https://www.google.com/search?q=rust", 1, "firefox-default");
        assert_eq!(bg.on_before_request(&req).await, Decision::Allow);
        assert_eq!(bg.host().storage_reads(), 1);
    }

    #[tokio::test]
    async fn test_intercept_all_off_from_storage() {
        let host = FakeHost::new();
        host.store("globalSettings", json!({ "language": "en", "interceptAll": false }));
        let bg = Background::new(host);
        let req = NavigationRequest::main_frame("https://example.com/", 1, "firefox-default");
        assert_eq!(bg.on_before_request(&req).await, Decision::Allow);
    }

    #[tokio::test]
    async fn test_whitelisted_tab_skips_storage() {
        let host = FakeHost::new();
        let bg = Background::new(host);
        bg.session_mut().whitelist.approve(5, BLANK_URL, bg.host().now_ms());
        let req = NavigationRequest::main_frame("https://example.com/", 5, "firefox-default");
        assert_eq!(bg.on_before_request(&req).await, Decision::Allow);
        assert_eq!(bg.host().storage_reads(), 0);
    }

    #[tokio::test]
    async fn test_stale_whitelist_entry_is_ignored() {
        let host = FakeHost::new();
        let bg = Background::new(host);
        bg.session_mut().whitelist.approve(5, BLANK_URL, bg.host().now_ms());
        bg.host().advance(WHITELIST_TTL_MS);
        let req = NavigationRequest::main_frame("https://example.com/", 5, "firefox-default");
        assert!(matches!(bg.on_before_request(&req).await, Decision::Redirect(_)));
        assert!(bg.session_mut().whitelist.get(5).is_none());
    }
}
