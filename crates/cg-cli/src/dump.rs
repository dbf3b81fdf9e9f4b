use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use cg_core::host::{Clock, Host, IdentityProvider, PreferenceStore, TabManager};
use cg_core::types::{Container, ContainerSpec, CookieStoreId, Tab, TabCreate, TabId};
use cg_core::HostError;

/// A `storage.local` export on disk, with tab and container calls recorded
/// instead of performed.
pub struct DumpHost {
    path: PathBuf,
    base: String,
    storage: RefCell<HashMap<String, Value>>,
    actions: RefCell<Vec<String>>,
    next_tab: Cell<TabId>,
}

impl DumpHost {
    pub fn open(path: &Path, base: &str) -> Result<Self, String> {
        let storage = if path.exists() {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("'{}' is not a storage export: {}", path.display(), e))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            base: base.to_string(),
            storage: RefCell::new(storage),
            actions: RefCell::new(Vec::new()),
            next_tab: Cell::new(1000),
        })
    }

    /// Write the (possibly modified) storage back to disk.
    pub fn save(&self) -> Result<(), String> {
        let storage = self.storage.borrow();
        let text = serde_json::to_string_pretty(&*storage).map_err(|e| e.to_string())?;
        fs::write(&self.path, text)
            .map_err(|e| format!("Failed to write '{}': {}", self.path.display(), e))
    }

    /// Browser calls the engine would have made.
    pub fn actions(&self) -> Vec<String> {
        self.actions.borrow().clone()
    }

    fn record(&self, action: String) {
        self.actions.borrow_mut().push(action);
    }
}

impl PreferenceStore for DumpHost {
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Value>, HostError> {
        let storage = self.storage.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| storage.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>, HostError> {
        Ok(self.storage.borrow().clone())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.storage.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

impl IdentityProvider for DumpHost {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<Container, HostError> {
        self.record(format!("contextualIdentities.create({:?})", spec.name));
        Err(HostError::Identity("containers are not available offline".to_string()))
    }

    async fn query_containers(&self) -> Result<Vec<Container>, HostError> {
        Ok(Vec::new())
    }

    async fn remove_container(&self, id: &CookieStoreId) -> Result<(), HostError> {
        self.record(format!("contextualIdentities.remove({id})"));
        Ok(())
    }
}

impl TabManager for DumpHost {
    async fn create_tab(&self, props: &TabCreate) -> Result<Tab, HostError> {
        let id = self.next_tab.get();
        self.next_tab.set(id + 1);
        self.record(format!("tabs.create({} in {}) -> tab {}", props.url, props.cookie_store_id, id));
        Ok(Tab {
            id,
            index: props.index.unwrap_or(0),
            cookie_store_id: Some(props.cookie_store_id.clone()),
        })
    }

    async fn update_tab(&self, tab_id: TabId, url: &str) -> Result<(), HostError> {
        self.record(format!("tabs.update({tab_id}, {url})"));
        Ok(())
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(format!("tabs.remove({tab_id})"));
        Ok(())
    }
}

impl Clock for DumpHost {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Host for DumpHost {
    fn extension_base(&self) -> String {
        self.base.clone()
    }
}
