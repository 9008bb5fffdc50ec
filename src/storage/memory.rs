use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

use anyhow::Result;

use super::{traits::KeyValueStore, Tier};
use crate::error::Error;

/// In-memory key-value store.
///
/// Clones share the same entries, so a test (or the simulator) can keep a
/// handle while the tiers own another one.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tier: Tier,
    entries: Rc<RefCell<BTreeMap<String, String>>>,
    unavailable: Rc<Cell<bool>>,
}

impl MemoryStore {
    pub fn new(tier: Tier) -> Self {
        MemoryStore {
            tier,
            entries: Rc::new(RefCell::new(BTreeMap::new())),
            unavailable: Rc::new(Cell::new(false)),
        }
    }

    /// Tab-scoped store
    pub fn session() -> Self {
        Self::new(Tier::Session)
    }

    /// Profile-scoped store
    pub fn local() -> Self {
        Self::new(Tier::Local)
    }

    /// Make every subsequent call fail, as storage does in privacy modes
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.borrow().clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.get() {
            return Err(Error::StorageUnavailable {
                tier: self.tier,
                reason: "storage disabled".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
