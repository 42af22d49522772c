//! In-memory key-value cache.
//!
//! Uses moka's concurrent cache implementation.

use moka::sync::Cache;

/// Thread-safe in-memory cache.
///
/// Used as the storage medium of [`MemStore`](crate::MemStore), where
/// nothing may be evicted, hence [`MemCache::unbounded`].
#[derive(Clone)]
pub struct MemCache<K, V> {
    items: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`] that never evicts.
    pub fn unbounded() -> Self {
        Self {
            items: Cache::builder().build(),
        }
    }

    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.items.insert(key, value);
    }

    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.items.get(key)
    }

    pub fn remove(
        &self,
        key: &K,
    ) {
        self.items.remove(key);
    }

    pub fn contains(
        &self,
        key: &K,
    ) -> bool {
        self.items.contains_key(key)
    }
}
