//! Store abstraction for historical caches
//!
//! A [`HistoricalStore`] is the collaborator that owns the actual time-indexed
//! data. The cache core only asks it to load a value for a key and to list
//! neighbouring keys; retention and eviction stay with the store.

use crate::error::Result;
use horizon_types::Timestamp;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

/// Time-indexed data a historical cache reads from.
///
/// Implementations are called synchronously and may be slow; the cache core
/// adds no retry or timeout.
pub trait HistoricalStore<V>: Send + Sync {
    /// Load the value stored at exactly `key`.
    fn load_value(&self, key: Timestamp) -> Result<Option<V>>;

    /// The latest key at or before `key`, or the first key after it when
    /// nothing earlier exists.
    fn resolve_key(&self, key: Timestamp) -> Result<Option<Timestamp>>;

    /// Up to `limit` keys at or before `key`, newest first.
    fn keys_before(&self, key: Timestamp, limit: usize) -> Result<Vec<Timestamp>>;

    /// Up to `limit` keys strictly after `key`, oldest first.
    fn keys_after(&self, key: Timestamp, limit: usize) -> Result<Vec<Timestamp>>;
}

/// Store access counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored keys
    pub key_count: usize,
    /// Values handed out by `load_value`
    pub loads: u64,
    /// Key lookups and key pages served
    pub key_queries: u64,
}

/// In-memory store backed by a `BTreeMap`
pub struct MemoryStore<V> {
    data: RwLock<BTreeMap<Timestamp, V>>,
    loads: AtomicU64,
    key_queries: AtomicU64,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            loads: AtomicU64::new(0),
            key_queries: AtomicU64::new(0),
        }
    }

    /// Insert or replace the value at `key`, returning the old one.
    pub fn insert(&self, key: Timestamp, value: V) -> Option<V> {
        self.data.write().insert(key, value)
    }

    pub fn remove(&self, key: Timestamp) -> Option<V> {
        self.data.write().remove(&key)
    }

    pub fn contains_key(&self, key: Timestamp) -> bool {
        self.data.read().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn clear(&self) {
        self.data.write().clear();
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            key_count: self.len(),
            loads: self.loads.load(Ordering::Relaxed),
            key_queries: self.key_queries.load(Ordering::Relaxed),
        }
    }

    fn count_key_query(&self) {
        self.key_queries.fetch_add(1, Ordering::Relaxed);
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(Timestamp, V)> for MemoryStore<V> {
    fn from_iter<I: IntoIterator<Item = (Timestamp, V)>>(iter: I) -> Self {
        let store = Self::new();
        store.data.write().extend(iter);
        store
    }
}

impl<V: Clone + Send + Sync> HistoricalStore<V> for MemoryStore<V> {
    fn load_value(&self, key: Timestamp) -> Result<Option<V>> {
        let value = self.data.read().get(&key).cloned();
        if value.is_some() {
            self.loads.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    fn resolve_key(&self, key: Timestamp) -> Result<Option<Timestamp>> {
        self.count_key_query();
        let data = self.data.read();
        let floor = data.range(..=key).next_back().map(|(k, _)| *k);
        Ok(floor.or_else(|| data.range(key..).next().map(|(k, _)| *k)))
    }

    fn keys_before(&self, key: Timestamp, limit: usize) -> Result<Vec<Timestamp>> {
        self.count_key_query();
        Ok(self
            .data
            .read()
            .range(..=key)
            .rev()
            .take(limit)
            .map(|(k, _)| *k)
            .collect())
    }

    fn keys_after(&self, key: Timestamp, limit: usize) -> Result<Vec<Timestamp>> {
        self.count_key_query();
        Ok(self
            .data
            .read()
            .range((Bound::Excluded(key), Bound::Unbounded))
            .take(limit)
            .map(|(k, _)| *k)
            .collect())
    }
}

impl<V> std::fmt::Debug for MemoryStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(secs: &[i64]) -> MemoryStore<String> {
        secs.iter()
            .map(|s| (Timestamp::from_secs(*s), format!("v{s}")))
            .collect()
    }

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_resolve_prefers_floor() {
        let store = store(&[10, 20, 30]);
        assert_eq!(store.resolve_key(ts(25)).unwrap(), Some(ts(20)));
        assert_eq!(store.resolve_key(ts(20)).unwrap(), Some(ts(20)));
        assert_eq!(store.resolve_key(ts(5)).unwrap(), Some(ts(10)));
        assert_eq!(MemoryStore::<String>::new().resolve_key(ts(5)).unwrap(), None);
    }

    #[test]
    fn test_key_pages() {
        let store = store(&[1, 2, 3, 4, 5]);
        assert_eq!(store.keys_before(ts(3), 10).unwrap(), vec![ts(3), ts(2), ts(1)]);
        assert_eq!(store.keys_before(ts(5), 2).unwrap(), vec![ts(5), ts(4)]);
        assert_eq!(store.keys_after(ts(3), 10).unwrap(), vec![ts(4), ts(5)]);
        assert_eq!(store.keys_after(ts(0), 2).unwrap(), vec![ts(1), ts(2)]);
        assert!(store.keys_after(ts(5), 2).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let store = store(&[1, 2]);
        store.load_value(ts(1)).unwrap();
        store.load_value(ts(9)).unwrap();
        store.keys_after(ts(0), 1).unwrap();

        let stats = store.stats();
        assert_eq!(stats.key_count, 2);
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.key_queries, 1);
    }

    #[test]
    fn test_insert_replaces() {
        let store = MemoryStore::new();
        assert_eq!(store.insert(ts(1), "a"), None);
        assert_eq!(store.insert(ts(1), "b"), Some("a"));
        assert_eq!(store.load_value(ts(1)).unwrap(), Some("b"));
        assert_eq!(store.remove(ts(1)), Some("b"));
        assert!(store.is_empty());
    }
}
