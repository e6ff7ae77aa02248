//! Read-through item cache.
//!
//! # Responsibility
//! - Define the cache seam the data store consults before its backend.
//! - Provide a bounded TTL cache on top of `moka`.
//!
//! # Invariants
//! - Cached items are copies; a cache never hands out shared mutable state.
//! - Entries expire after the configured TTL, which bounds staleness for
//!   writes that bypass the owning store.

use crate::config::StoreConfig;
use crate::model::item::Item;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Cache consulted by `DataStore` for keyed reads.
pub trait ItemCache<T: Item>: Send + Sync {
    fn get(&self, key: &T::Key) -> Option<T>;

    fn put(&self, item: &T);

    fn invalidate(&self, key: &T::Key);

    fn clear(&self);
}

impl<T: Item, C: ItemCache<T> + ?Sized> ItemCache<T> for Arc<C> {
    fn get(&self, key: &T::Key) -> Option<T> {
        (**self).get(key)
    }

    fn put(&self, item: &T) {
        (**self).put(item);
    }

    fn invalidate(&self, key: &T::Key) {
        (**self).invalidate(key);
    }

    fn clear(&self) {
        (**self).clear();
    }
}

/// Size-bounded cache whose entries expire a fixed time after insertion.
pub struct TtlCache<T: Item> {
    entries: Cache<T::Key, T>,
    ttl: Duration,
}

impl<T: Item> TtlCache<T> {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            ttl,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.cache_ttl(), config.cache_capacity)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}

impl<T: Item> ItemCache<T> for TtlCache<T> {
    fn get(&self, key: &T::Key) -> Option<T> {
        self.entries.get(key)
    }

    fn put(&self, item: &T) {
        self.entries.insert(item.key().clone(), item.clone());
    }

    fn invalidate(&self, key: &T::Key) {
        self.entries.invalidate(key);
    }

    fn clear(&self) {
        self.entries.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::{ItemCache, TtlCache};
    use crate::config::StoreConfig;
    use crate::model::item::HasKey;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
        name: String,
    }

    impl HasKey for Profile {
        type Key = u64;

        fn key(&self) -> &u64 {
            &self.id
        }
    }

    fn profile(id: u64, name: &str) -> Profile {
        Profile {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn put_get_and_invalidate() {
        let cache = TtlCache::from_config(&StoreConfig::default());
        cache.put(&profile(1, "ada"));
        cache.put(&profile(1, "grace"));
        assert_eq!(cache.get(&1), Some(profile(1, "grace")));

        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.ttl(), Duration::from_secs(300));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_millis(50), 10);
        cache.put(&profile(7, "lin"));
        assert!(cache.get(&7).is_some());
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get(&7), None);
    }

    #[test]
    fn clear_drops_everything() {
        let cache = TtlCache::new(Duration::from_secs(60), 10);
        cache.put(&profile(1, "a"));
        cache.put(&profile(2, "b"));
        cache.clear();
        assert_eq!(cache.entry_count(), 0);
    }
}
