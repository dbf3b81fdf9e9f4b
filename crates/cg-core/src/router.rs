//! Background engine: chooser completion and tab lifecycle
//!
//! [`Background`] owns the per-tab session state and is the single entry point
//! the embedding calls into: `on_before_request` (see `interceptor`),
//! `on_message`, `on_tab_removed`, `on_menu_clicked` and the periodic `sweep`.
//!
//! Handlers run on a single thread and only suspend at collaborator calls.
//! Session state is borrowed briefly between those points, never across one.

use std::cell::{RefCell, RefMut};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::host::Host;
use crate::prefs::SiteRecord;
use crate::types::{Container, ContainerSpec, CookieStoreId, Tab, TabCreate, TabId};
use crate::url::{ChooserUrl, BLANK_URL};
use crate::whitelist::{GuestSessions, TransientWhitelist};

/// Context menu entries registered at startup: (id, title).
pub const MENU_ITEMS: &[(&str, &str)] = &[
    (MENU_OPEN_SELECTOR, "Select Profile"),
    (MENU_ADD_PROFILE, "Add Profile"),
];

pub const MENU_OPEN_SELECTOR: &str = "open-selector";
pub const MENU_ADD_PROFILE: &str = "add-profile";

const GUEST_COLOR: &str = "toolbar";
const GUEST_ICON: &str = "circle";

// =============================================================================
// Messages
// =============================================================================

/// Messages sent by the chooser page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Create a throwaway container and return its descriptor
    #[serde(rename = "CREATE_GUEST")]
    CreateGuest,
    /// Open the pending navigation in the chosen container
    #[serde(rename = "OPEN_URL", rename_all = "camelCase")]
    OpenUrl {
        url: String,
        cookie_store_id: CookieStoreId,
        /// "Always open this site here"
        #[serde(default)]
        save_preference: bool,
        #[serde(default)]
        hostname: Option<String>,
        #[serde(default)]
        profile_id: Option<String>,
        #[serde(default)]
        is_guest: bool,
    },
}

/// `runtime.MessageSender`, reduced to what routing needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub tab: Option<Tab>,
}

/// Response to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Container(Container),
    None,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub whitelisted_tabs: usize,
    pub guest_sessions: usize,
}

// =============================================================================
// Background
// =============================================================================

/// Per-tab state owned by the engine.
#[derive(Debug, Default)]
pub struct Session {
    pub whitelist: TransientWhitelist,
    pub guests: GuestSessions,
}

/// The background engine, generic over its embedding.
pub struct Background<H> {
    host: H,
    chooser: ChooserUrl,
    session: RefCell<Session>,
}

impl<H: Host> Background<H> {
    pub fn new(host: H) -> Self {
        let chooser = ChooserUrl::new(&host.extension_base());
        Self {
            host,
            chooser,
            session: RefCell::new(Session::default()),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn chooser(&self) -> &ChooserUrl {
        &self.chooser
    }

    /// Borrow the session. The guard must be dropped before the next `.await`.
    pub(crate) fn session_mut(&self) -> RefMut<'_, Session> {
        self.session.borrow_mut()
    }

    pub fn stats(&self) -> SessionStats {
        let session = self.session.borrow();
        SessionStats {
            whitelisted_tabs: session.whitelist.len(),
            guest_sessions: session.guests.len(),
        }
    }

    /// Periodic whitelist garbage collection.
    pub fn sweep(&self) -> usize {
        let now = self.host.now_ms();
        let removed = self.session_mut().whitelist.sweep(now);
        if removed > 0 {
            debug!("Swept {removed} stale whitelist entries");
        }
        removed
    }

    // -------------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------------

    pub async fn on_message(&self, message: Message, sender: &Sender) -> Result<Reply, HostError> {
        match message {
            Message::CreateGuest => self.create_guest().await.map(Reply::Container),
            Message::OpenUrl {
                url,
                cookie_store_id,
                save_preference,
                hostname,
                profile_id,
                is_guest,
            } => {
                if save_preference {
                    if let Some(hostname) = hostname.as_deref().filter(|h| !h.is_empty()) {
                        if let Err(e) = self.remember(hostname, &cookie_store_id, profile_id).await {
                            error!("Save pref failed: {e}");
                        }
                    }
                }
                self.open_url(&url, &cookie_store_id, is_guest, sender.tab.as_ref()).await;
                Ok(Reply::None)
            }
        }
    }

    /// Create a guest container named after the clock.
    pub async fn create_guest(&self) -> Result<Container, HostError> {
        let spec = ContainerSpec {
            name: format!("Guest {:04}", self.host.now_ms() % 10_000),
            color: GUEST_COLOR.to_string(),
            icon: GUEST_ICON.to_string(),
        };
        self.host.create_container(&spec).await.inspect_err(|e| {
            error!("Error creating guest container: {e}");
        })
    }

    /// Upsert the site record with "always open in `cookie_store_id`".
    /// Read-modify-write without a lock: concurrent writers to the same host
    /// race and the last one wins.
    pub async fn remember(
        &self,
        hostname: &str,
        cookie_store_id: &CookieStoreId,
        profile_id: Option<String>,
    ) -> Result<(), HostError> {
        let stored = self.host.get(hostname).await?;
        let mut record = SiteRecord::from_stored(hostname, stored.as_ref())?.unwrap_or_else(SiteRecord::new);
        record.remember(cookie_store_id.clone(), profile_id);
        self.host.set(hostname, record.to_value()).await
    }

    /// Navigate to `url` inside `cookie_store_id`, reusing the sender tab when
    /// it already runs there.
    async fn open_url(&self, url: &str, cookie_store_id: &CookieStoreId, is_guest: bool, sender: Option<&Tab>) {
        let now = self.host.now_ms();

        if let Some(tab) = sender.filter(|tab| tab.cookie_store_id.as_ref() == Some(cookie_store_id)) {
            {
                let mut session = self.session_mut();
                session.whitelist.approve(tab.id, url, now);
                if is_guest {
                    self.register_guest(&mut session, tab.id, cookie_store_id);
                }
            }
            if let Err(e) = self.host.update_tab(tab.id, url).await {
                error!("Tab update failed: {e}");
            }
            return;
        }

        if let Err(e) = self.open_in_new_tab(url, cookie_store_id, is_guest, sender, now).await {
            error!("Tab creation failed: {e}");
        }
    }

    /// Blank tab next to the sender, whitelist it, navigate, then close the sender.
    async fn open_in_new_tab(
        &self,
        url: &str,
        cookie_store_id: &CookieStoreId,
        is_guest: bool,
        sender: Option<&Tab>,
        now: u64,
    ) -> Result<(), HostError> {
        let props = TabCreate {
            url: BLANK_URL.to_string(),
            cookie_store_id: cookie_store_id.clone(),
            active: true,
            index: sender.map(|tab| tab.index + 1),
        };
        let tab = self.host.create_tab(&props).await?;

        {
            let mut session = self.session_mut();
            session.whitelist.approve(tab.id, url, now);
            if is_guest {
                self.register_guest(&mut session, tab.id, cookie_store_id);
            }
        }

        self.host.update_tab(tab.id, url).await?;

        if let Some(sender) = sender {
            self.host.remove_tab(sender.id).await?;
        }
        Ok(())
    }

    fn register_guest(&self, session: &mut Session, tab_id: TabId, cookie_store_id: &CookieStoreId) {
        if let Some(previous) = session.guests.register(tab_id, cookie_store_id.clone()) {
            if previous != *cookie_store_id {
                warn!("Tab {tab_id} replaced guest container {previous}; it will not be removed");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Tabs
    // -------------------------------------------------------------------------

    /// `tabs.onRemoved`: tear down the tab's guest container, exactly once.
    pub async fn on_tab_removed(&self, tab_id: TabId) {
        let guest = {
            let mut session = self.session_mut();
            session.whitelist.remove(tab_id);
            match session.guests.take(tab_id) {
                Some(id) if session.guests.is_referenced(&id) => {
                    warn!("Guest container {id} still in use, keeping it");
                    None
                }
                other => other,
            }
        };

        let Some(cookie_store_id) = guest else {
            return;
        };

        match self.host.remove_container(&cookie_store_id).await {
            Ok(()) => info!("Guest container {cookie_store_id} removed for tab {tab_id}"),
            Err(e) => error!("Failed to remove guest container {cookie_store_id}: {e}"),
        }
    }

    // -------------------------------------------------------------------------
    // Context menu
    // -------------------------------------------------------------------------

    /// `menus.onClicked`: send the tab to the chooser for the link (or page).
    /// Returns the chooser URL, or None when the target is not a web page.
    pub async fn on_menu_clicked(
        &self,
        menu_item_id: &str,
        link_url: Option<&str>,
        page_url: Option<&str>,
        tab_id: TabId,
    ) -> Result<Option<String>, HostError> {
        let Some(target) = link_url.or(page_url).filter(|url| url.starts_with("http")) else {
            return Ok(None);
        };

        let chooser_url = if menu_item_id == MENU_ADD_PROFILE {
            self.chooser.for_new_profile(target)
        } else {
            self.chooser.for_target(target)
        };

        self.host.update_tab(tab_id, &chooser_url).await?;
        Ok(Some(chooser_url))
    }
}
