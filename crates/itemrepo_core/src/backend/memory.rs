//! In-process map backend.
//!
//! # Responsibility
//! - Keep items in key order behind a read/write lock.
//! - Serve as the reference direct-index backend.
//!
//! # Invariants
//! - Unordered scans return items in key order.
//! - Stored items are clones; callers never observe shared mutation.

use crate::backend::{Backend, Capabilities, PagingTier};
use crate::error::{StoreError, StoreResult};
use crate::model::item::Item;
use crate::query::exec::{apply_stage, count_matching};
use crate::query::plan::Stage;
use std::collections::BTreeMap;
use std::sync::RwLock;

const BACKEND_NAME: &str = "memory";

/// Direct-index backend over a `BTreeMap`.
pub struct MemoryBackend<T: Item> {
    items: RwLock<BTreeMap<T::Key, T>>,
}

impl<T: Item> MemoryBackend<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
        }
    }

    /// Builds a backend pre-filled with items; later duplicates win.
    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        let map = items
            .into_iter()
            .map(|item| (item.key().clone(), item))
            .collect();
        Self {
            items: RwLock::new(map),
        }
    }

    pub fn len(&self) -> StoreResult<usize> {
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
        Ok(items.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl<T: Item> Default for MemoryBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Backend<T> for MemoryBackend<T> {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tier: PagingTier::DirectIndex,
            cheap_count: true,
            predicate_pushdown: false,
        }
    }

    fn get(&self, key: &T::Key) -> StoreResult<Option<T>> {
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
        Ok(items.get(key).cloned())
    }

    fn upsert(&self, item: &T) -> StoreResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
        items.insert(item.key().clone(), item.clone());
        Ok(())
    }

    fn delete(&self, key: &T::Key) -> StoreResult<bool> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
        Ok(items.remove(key).is_some())
    }

    fn scan(&self, stage: &Stage<T>) -> StoreResult<Vec<T>> {
        let snapshot: Vec<T> = {
            let items = self
                .items
                .read()
                .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
            items.values().cloned().collect()
        };
        apply_stage(snapshot, stage)
    }

    fn count(&self, stage: &Stage<T>) -> StoreResult<u64> {
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
        if stage.filters.is_empty() {
            return Ok(items.len() as u64);
        }
        count_matching(items.values(), &stage.filters)
    }
}
