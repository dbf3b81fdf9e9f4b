//! In-memory browser used by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use serde_json::Value;

use crate::error::HostError;
use crate::host::{Clock, Host, IdentityProvider, PreferenceStore, TabManager};
use crate::types::{Container, ContainerSpec, CookieStoreId, Tab, TabCreate, TabId};

pub const EXTENSION_BASE: &str = "moz-extension://test-uuid/";

const START_MS: u64 = 1_700_000_012_345;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    CreateTab(TabCreate),
    UpdateTab(TabId, String),
    RemoveTab(TabId),
    CreateContainer(ContainerSpec),
    RemoveContainer(CookieStoreId),
}

impl HostCall {
    fn is_tab_call(&self) -> bool {
        matches!(
            self,
            HostCall::CreateTab(_) | HostCall::UpdateTab(..) | HostCall::RemoveTab(_)
        )
    }
}

pub struct FakeHost {
    storage: RefCell<HashMap<String, Value>>,
    containers: RefCell<Vec<Container>>,
    calls: RefCell<Vec<HostCall>>,
    now: Cell<u64>,
    next_tab: Cell<TabId>,
    next_container: Cell<u32>,
    last_tab: Cell<Option<TabId>>,
    storage_reads: Cell<usize>,
    fail_storage: Cell<bool>,
    fail_tab_create: Cell<bool>,
    fail_identity: Cell<bool>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            storage: RefCell::new(HashMap::new()),
            containers: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            now: Cell::new(START_MS),
            next_tab: Cell::new(100),
            next_container: Cell::new(10),
            last_tab: Cell::new(None),
            storage_reads: Cell::new(0),
            fail_storage: Cell::new(false),
            fail_tab_create: Cell::new(false),
            fail_identity: Cell::new(false),
        }
    }

    pub fn store(&self, key: &str, value: Value) {
        self.storage.borrow_mut().insert(key.to_string(), value);
    }

    pub fn stored(&self, key: &str) -> Option<Value> {
        self.storage.borrow().get(key).cloned()
    }

    pub fn add_container(&self, id: &str, name: &str) {
        self.containers.borrow_mut().push(Container {
            cookie_store_id: CookieStoreId::new(id),
            name: name.to_string(),
            color: "blue".to_string(),
            icon: "circle".to_string(),
        });
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn fail_storage(&self, fail: bool) {
        self.fail_storage.set(fail);
    }

    pub fn fail_tab_create(&self, fail: bool) {
        self.fail_tab_create.set(fail);
    }

    pub fn fail_identity(&self, fail: bool) {
        self.fail_identity.set(fail);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn tab_calls(&self) -> Vec<HostCall> {
        self.calls.borrow().iter().filter(|c| c.is_tab_call()).cloned().collect()
    }

    pub fn container_removals(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, HostCall::RemoveContainer(_)))
            .count()
    }

    pub fn last_created_tab(&self) -> Option<TabId> {
        self.last_tab.get()
    }

    pub fn storage_reads(&self) -> usize {
        self.storage_reads.get()
    }

    fn record(&self, call: HostCall) {
        self.calls.borrow_mut().push(call);
    }

    fn check_storage(&self) -> Result<(), HostError> {
        if self.fail_storage.get() {
            Err(HostError::Storage("storage unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl PreferenceStore for FakeHost {
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Value>, HostError> {
        self.storage_reads.set(self.storage_reads.get() + 1);
        self.check_storage()?;
        let storage = self.storage.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| storage.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>, HostError> {
        self.storage_reads.set(self.storage_reads.get() + 1);
        self.check_storage()?;
        Ok(self.storage.borrow().clone())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.check_storage()?;
        self.store(key, value);
        Ok(())
    }

}

impl IdentityProvider for FakeHost {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<Container, HostError> {
        self.record(HostCall::CreateContainer(spec.clone()));
        if self.fail_identity.get() {
            return Err(HostError::Identity("contextual identities disabled".into()));
        }
        let n = self.next_container.get();
        self.next_container.set(n + 1);
        let container = Container {
            cookie_store_id: CookieStoreId::new(format!("firefox-container-{n}")),
            name: spec.name.clone(),
            color: spec.color.clone(),
            icon: spec.icon.clone(),
        };
        self.containers.borrow_mut().push(container.clone());
        Ok(container)
    }

    async fn query_containers(&self) -> Result<Vec<Container>, HostError> {
        if self.fail_identity.get() {
            return Err(HostError::Identity("contextual identities disabled".into()));
        }
        Ok(self.containers.borrow().clone())
    }

    async fn remove_container(&self, id: &CookieStoreId) -> Result<(), HostError> {
        self.record(HostCall::RemoveContainer(id.clone()));
        let mut containers = self.containers.borrow_mut();
        let before = containers.len();
        containers.retain(|c| &c.cookie_store_id != id);
        if containers.len() == before {
            return Err(HostError::UnknownContainer(id.to_string()));
        }
        Ok(())
    }
}

impl TabManager for FakeHost {
    async fn create_tab(&self, props: &TabCreate) -> Result<Tab, HostError> {
        self.record(HostCall::CreateTab(props.clone()));
        if self.fail_tab_create.get() {
            return Err(HostError::Tab("cannot create tab".into()));
        }
        let id = self.next_tab.get();
        self.next_tab.set(id + 1);
        self.last_tab.set(Some(id));
        Ok(Tab {
            id,
            index: props.index.unwrap_or(0),
            cookie_store_id: Some(props.cookie_store_id.clone()),
        })
    }

    async fn update_tab(&self, tab_id: TabId, url: &str) -> Result<(), HostError> {
        self.record(HostCall::UpdateTab(tab_id, url.to_string()));
        Ok(())
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(HostCall::RemoveTab(tab_id));
        Ok(())
    }
}

impl Clock for FakeHost {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

impl Host for FakeHost {
    fn extension_base(&self) -> String {
        EXTENSION_BASE.to_string()
    }
}
