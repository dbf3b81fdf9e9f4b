//! Per-tab session bookkeeping
//!
//! Two small maps keyed by tab id, both owned by the background engine:
//!
//! - `TransientWhitelist`: lets a navigation the user already approved pass
//!   the interceptor without prompting again. Entries expire after
//!   [`WHITELIST_TTL_MS`] and are swept every [`SWEEP_INTERVAL_MS`].
//! - `GuestSessions`: remembers which throwaway container belongs to which
//!   tab so it can be removed when the tab closes.

use std::collections::HashMap;

use crate::types::{CookieStoreId, TabId};
use crate::url::{hostname, same_site, BLANK_URL};

/// Lifetime of a whitelist entry.
pub const WHITELIST_TTL_MS: u64 = 15_000;

/// Cadence of the background sweep.
pub const SWEEP_INTERVAL_MS: u64 = 5_000;

// =============================================================================
// Transient Whitelist
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistEntry {
    /// Approved destination, or `about:blank` to let the next navigation through
    pub url: String,
    /// Approval time in milliseconds
    pub timestamp: u64,
}

impl WhitelistEntry {
    fn age(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp)
    }

    fn is_stale(&self, now_ms: u64) -> bool {
        self.age(now_ms) >= WHITELIST_TTL_MS
    }

    /// Does this approval cover a navigation to `url`?
    /// Same host (ignoring `www.`) or a literal prefix, which covers redirect chains.
    fn covers(&self, url: &str) -> bool {
        if self.url == BLANK_URL || url.starts_with(&self.url) {
            return true;
        }
        match (hostname(&self.url), hostname(url)) {
            (Some(approved), Some(current)) => same_site(&approved, &current),
            _ => false,
        }
    }
}

/// Result of consulting the whitelist for one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistCheck {
    /// Live entry covering the destination
    Allowed,
    /// Entry was too old and has been dropped
    Expired,
    /// Live entry for another destination; left in place
    NoMatch,
    /// Nothing recorded for the tab
    Absent,
}

/// Time-bounded per-tab approvals.
#[derive(Debug, Default)]
pub struct TransientWhitelist {
    entries: HashMap<TabId, WhitelistEntry>,
}

impl TransientWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Approve the next navigation of `tab_id` to `url`. Replaces any prior entry.
    pub fn approve(&mut self, tab_id: TabId, url: impl Into<String>, now_ms: u64) {
        self.entries.insert(
            tab_id,
            WhitelistEntry {
                url: url.into(),
                timestamp: now_ms,
            },
        );
    }

    pub fn get(&self, tab_id: TabId) -> Option<&WhitelistEntry> {
        self.entries.get(&tab_id)
    }

    pub fn remove(&mut self, tab_id: TabId) -> Option<WhitelistEntry> {
        self.entries.remove(&tab_id)
    }

    /// Check a navigation against the tab's entry. Matching entries are not
    /// consumed so redirects within the window still pass; stale ones are dropped.
    pub fn check(&mut self, tab_id: TabId, url: &str, now_ms: u64) -> WhitelistCheck {
        let Some(entry) = self.entries.get(&tab_id) else {
            return WhitelistCheck::Absent;
        };

        if entry.is_stale(now_ms) {
            self.entries.remove(&tab_id);
            return WhitelistCheck::Expired;
        }

        if entry.covers(url) {
            WhitelistCheck::Allowed
        } else {
            WhitelistCheck::NoMatch
        }
    }

    /// Drop every stale entry. Returns how many were removed.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_stale(now_ms));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Guest Sessions
// =============================================================================

/// Guest containers, one per owning tab.
#[derive(Debug, Default)]
pub struct GuestSessions {
    sessions: HashMap<TabId, CookieStoreId>,
}

impl GuestSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tie a guest container to a tab. Returns a container the tab previously owned.
    pub fn register(&mut self, tab_id: TabId, cookie_store_id: CookieStoreId) -> Option<CookieStoreId> {
        self.sessions.insert(tab_id, cookie_store_id)
    }

    /// Remove and return the tab's guest container. A second call yields None.
    pub fn take(&mut self, tab_id: TabId) -> Option<CookieStoreId> {
        self.sessions.remove(&tab_id)
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.sessions.contains_key(&tab_id)
    }

    /// Is any tab still using this container?
    pub fn is_referenced(&self, cookie_store_id: &CookieStoreId) -> bool {
        self.sessions.values().any(|id| id == cookie_store_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
