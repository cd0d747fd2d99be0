//! Historical entries: a key and a value loaded on first use.

use crate::error::{HorizonError, Result};
use crate::merge::Keyed;
use crate::storage::HistoricalStore;
use horizon_types::Timestamp;
use once_cell::sync::OnceCell;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Immutable `(key, value)` pair.
///
/// The value is loaded from the store the first time it is requested and
/// never again; concurrent first requests block on a single load. A failed
/// load is not remembered, so a later call tries again.
pub struct HistoricalEntry<V> {
    key: Timestamp,
    value: OnceCell<V>,
    store: Option<Arc<dyn HistoricalStore<V>>>,
}

impl<V> HistoricalEntry<V> {
    /// Entry with a value that is already known.
    pub fn new(key: Timestamp, value: V) -> Self {
        Self {
            key,
            value: OnceCell::with_value(value),
            store: None,
        }
    }

    /// Entry whose value is loaded from `store` on first access.
    pub fn lazy(key: Timestamp, store: Arc<dyn HistoricalStore<V>>) -> Self {
        Self {
            key,
            value: OnceCell::new(),
            store: Some(store),
        }
    }

    pub fn key(&self) -> Timestamp {
        self.key
    }

    pub fn is_loaded(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn value(&self) -> Result<&V> {
        self.value.get_or_try_init(|| {
            let store = self
                .store
                .as_ref()
                .ok_or_else(|| HorizonError::load(self.key, "entry has no store"))?;
            log::trace!("loading value for key {}", self.key);
            store
                .load_value(self.key)?
                .ok_or_else(|| HorizonError::load(self.key, "no value stored at key"))
        })
    }
}

impl<V> Keyed for HistoricalEntry<V> {
    fn key(&self) -> Timestamp {
        self.key
    }
}

impl<V> PartialEq for HistoricalEntry<V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<V> Eq for HistoricalEntry<V> {}

impl<V> PartialOrd for HistoricalEntry<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V> Ord for HistoricalEntry<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl<V> Hash for HistoricalEntry<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for HistoricalEntry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalEntry")
            .field("key", &self.key)
            .field("value", &self.value.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_value_loads_once() {
        let store = Arc::new(MemoryStore::new());
        store.insert(Timestamp::from_secs(1), 10u32);

        let entry = HistoricalEntry::<u32>::lazy(Timestamp::from_secs(1), store.clone());
        assert!(!entry.is_loaded());
        assert_eq!(*entry.value().unwrap(), 10);

        store.insert(Timestamp::from_secs(1), 99);
        assert_eq!(*entry.value().unwrap(), 10);
        assert_eq!(store.stats().loads, 1);
    }

    #[test]
    fn test_missing_value_is_load_error() {
        let store: Arc<MemoryStore<u32>> = Arc::new(MemoryStore::new());
        let entry = HistoricalEntry::<u32>::lazy(Timestamp::from_secs(3), store.clone());
        assert!(matches!(entry.value(), Err(HorizonError::Load { .. })));

        store.insert(Timestamp::from_secs(3), 7);
        assert_eq!(*entry.value().unwrap(), 7);
    }

    #[test]
    fn test_ordering_ignores_value() {
        let a = HistoricalEntry::new(Timestamp::from_secs(1), "z");
        let b = HistoricalEntry::new(Timestamp::from_secs(2), "a");
        let c = HistoricalEntry::new(Timestamp::from_secs(1), "other");
        assert!(a < b);
        assert_eq!(a, c);
    }
}
