//! Reference in-memory version store.
//!
//! The simplest implementation of the [`VersionStore`] contract: a hashmap of
//! snapshots plus an insertion-order index. All data is lost on drop. Suited
//! to the single-caller embedding the engine assumes; deployments that need
//! durability use [`super::DurableVersionStore`].

use std::collections::HashMap;

use crate::error::StoreError;
use crate::store::{Snapshot, StoreResult, VersionStore};

/// In-memory snapshot store with an insertion-ordered `list()`.
#[derive(Debug)]
pub struct MemoryVersionStore<V> {
    versions: HashMap<String, V>,
    /// Ids in the order they were first saved; keeps `list()` deterministic.
    order: Vec<String>,
    active: Option<String>,
}

impl<V> MemoryVersionStore<V> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            versions: HashMap::new(),
            order: Vec::new(),
            active: None,
        }
    }

    /// Number of saved versions.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether the store has no versions.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl<V> Default for MemoryVersionStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Snapshot> VersionStore<V> for MemoryVersionStore<V> {
    fn save(&mut self, version: V) -> StoreResult<()> {
        let id = version.id().to_string();
        if !self.versions.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.versions.insert(id, version);
        Ok(())
    }

    fn get(&self, id: &str) -> StoreResult<Option<V>> {
        Ok(self.versions.get(id).cloned())
    }

    fn get_active(&self) -> StoreResult<Option<V>> {
        Ok(self
            .active
            .as_ref()
            .and_then(|id| self.versions.get(id))
            .cloned())
    }

    fn set_active(&mut self, id: &str) -> StoreResult<()> {
        if !self.versions.contains_key(id) {
            return Err(StoreError::VersionNotFound { id: id.to_string() });
        }
        self.active = Some(id.to_string());
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<V>> {
        Ok(self
            .order
            .iter()
            .filter_map(|id| self.versions.get(id))
            .cloned()
            .collect())
    }
}
