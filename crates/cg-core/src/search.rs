//! Built-in search engine exclusion
//!
//! Search result pages are never intercepted on unconfigured sites, even when
//! "intercept all" is on: every query would otherwise bounce through the
//! chooser.

/// Leading labels that identify a search engine host.
const SEARCH_ENGINE_LABELS: &[&str] = &["google", "bing", "yahoo", "duckduckgo", "yandex", "baidu", "ask"];

/// Registrable domains the site editor warns about.
const SEARCH_ENGINE_DOMAINS: &[&str] = &[
    "google.com",
    "bing.com",
    "yahoo.com",
    "duckduckgo.com",
    "yandex.com",
    "baidu.com",
    "ask.com",
];

/// Matches `^(www\.)?(google|bing|yahoo|duckduckgo|yandex|baidu|ask)\.` ignoring ASCII case.
pub fn is_search_engine_host(host: &str) -> bool {
    let bytes = host.as_bytes();
    let rest = if bytes.len() >= 4 && bytes[..4].eq_ignore_ascii_case(b"www.") {
        &bytes[4..]
    } else {
        bytes
    };

    SEARCH_ENGINE_LABELS.iter().any(|label| {
        let label = label.as_bytes();
        rest.len() > label.len()
            && rest[..label.len()].eq_ignore_ascii_case(label)
            && rest[label.len()] == b'.'
    })
}

/// Host equals, or is a subdomain of, a well-known search engine domain.
pub fn is_search_engine_domain(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    SEARCH_ENGINE_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}
