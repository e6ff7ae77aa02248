//! Data store facade.
//!
//! # Responsibility
//! - Provide keyed get/store/remove plus `query()` over any backend.
//! - Consult an optional item cache for keyed reads.
//!
//! # Invariants
//! - Blank keys read as "not found" and remove nothing.
//! - Storing `None` is a successful no-op.
//! - The cache is filled only after the backend accepted a write and is
//!   invalidated on every remove routed through this store.
//!
//! # See also
//! - `query::chain` for the query surface returned by `query()`.

use crate::backend::{Backend, Capabilities};
use crate::cache::ItemCache;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::item::{Item, ItemKey};
use crate::query::chain::Query;
use crate::query::engine::PagingOptions;
use crate::query::plan::Stage;
use log::debug;
use std::sync::Arc;

/// Keyed access and query entry point for one item type.
pub struct DataStore<T: Item> {
    backend: Arc<dyn Backend<T>>,
    options: PagingOptions,
    cache: Option<Arc<dyn ItemCache<T>>>,
}

impl<T: Item> Clone for DataStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            options: self.options,
            cache: self.cache.clone(),
        }
    }
}

impl<T: Item> DataStore<T> {
    /// Store over `backend` with default paging options and no cache.
    pub fn new<B>(backend: B) -> Self
    where
        B: Backend<T> + 'static,
    {
        Self::from_shared(Arc::new(backend))
    }

    pub fn from_shared(backend: Arc<dyn Backend<T>>) -> Self {
        Self {
            backend,
            options: PagingOptions::default(),
            cache: None,
        }
    }

    /// Store using the paging options of `config`.
    pub fn with_config<B>(backend: B, config: &StoreConfig) -> Self
    where
        B: Backend<T> + 'static,
    {
        Self {
            options: config.paging_options(),
            ..Self::new(backend)
        }
    }

    pub fn with_cache<C>(mut self, cache: C) -> Self
    where
        C: ItemCache<T> + 'static,
    {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    /// Item stored under `key`; `None` when missing or when `key` is blank.
    pub fn get_item(&self, key: &T::Key) -> StoreResult<Option<T>> {
        if key.is_blank() {
            return Ok(None);
        }
        if let Some(cached) = self.cache.as_ref().and_then(|cache| cache.get(key)) {
            debug!(
                "event=get_item module=store backend={} cache=hit",
                self.backend.name()
            );
            return Ok(Some(cached));
        }

        let found = self.backend.get(key)?;
        if let (Some(cache), Some(item)) = (&self.cache, &found) {
            cache.put(item);
        }
        debug!(
            "event=get_item module=store backend={} cache=miss found={}",
            self.backend.name(),
            found.is_some()
        );
        Ok(found)
    }

    /// Found items in request order; blank and missing keys are skipped.
    pub fn get_items<'a, I>(&self, keys: I) -> StoreResult<Vec<T>>
    where
        I: IntoIterator<Item = &'a T::Key>,
    {
        let mut found = Vec::new();
        for key in keys {
            if let Some(item) = self.get_item(key)? {
                found.push(item);
            }
        }
        Ok(found)
    }

    pub fn contains(&self, key: &T::Key) -> StoreResult<bool> {
        Ok(self.get_item(key)?.is_some())
    }

    /// Inserts or replaces the item; `None` is accepted and ignored.
    ///
    /// # Errors
    /// - `StoreError::InvalidData` when the item key is blank.
    /// - Backend failures, unchanged.
    pub fn store_item<'a>(&self, item: impl Into<Option<&'a T>>) -> StoreResult<()> {
        let Some(item) = item.into() else {
            return Ok(());
        };
        if item.key().is_blank() {
            return Err(StoreError::InvalidData(
                "cannot store an item with a blank key".to_string(),
            ));
        }

        self.backend.upsert(item)?;
        if let Some(cache) = &self.cache {
            cache.put(item);
        }
        debug!(
            "event=store_item module=store status=ok backend={}",
            self.backend.name()
        );
        Ok(())
    }

    /// Stores every item in order; stops at the first failure.
    pub fn store_items(&self, items: &[T]) -> StoreResult<usize> {
        for item in items {
            self.store_item(item)?;
        }
        Ok(items.len())
    }

    /// Removes by key; `false` when nothing was stored or the key is blank.
    pub fn remove_item(&self, key: &T::Key) -> StoreResult<bool> {
        if key.is_blank() {
            return Ok(false);
        }
        if let Some(cache) = &self.cache {
            cache.invalidate(key);
        }
        let removed = self.backend.delete(key)?;
        debug!(
            "event=remove_item module=store backend={} removed={removed}",
            self.backend.name()
        );
        Ok(removed)
    }

    /// Number of keys that were actually removed.
    pub fn remove_items<'a, I>(&self, keys: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = &'a T::Key>,
    {
        let mut removed = 0;
        for key in keys {
            if self.remove_item(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of stored items.
    pub fn count(&self) -> StoreResult<u64> {
        self.backend.count(&Stage::default())
    }

    /// Empty query chain bound to this store's backend.
    pub fn query(&self) -> Query<T> {
        Query::with_options(Arc::clone(&self.backend), self.options)
    }
}
