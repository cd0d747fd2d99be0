//! Historical cache: a dependent of an adjust-key provider that answers
//! queries over a store.

use crate::adjust::{AdjustKeyProvider, AdjustedKey, DependentCache};
use crate::builder::HistoricalCacheBuilder;
use crate::config::Config;
use crate::entry::HistoricalEntry;
use crate::error::Result;
use crate::query::{HistoricalQuery, KeysQueryInterceptor};
use crate::storage::HistoricalStore;
use horizon_types::Timestamp;
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries served from the memo
    pub hits: u64,
    /// Entries created because the memo did not hold them
    pub misses: u64,
    /// Times the cache was cleared
    pub clears: u64,
    /// Entries dropped from the memo to stay within `memo_capacity`
    pub evictions: u64,
    /// Entries currently memoized
    pub memoized: usize,
}

/// Time-indexed cache bounded by its provider's highest allowed key.
///
/// Entries handed out by queries are memoized until the cache is cleared,
/// which happens when the provider's boundary first becomes defined or the
/// provider is cleared. The memo holds at most `memo_capacity` entries and
/// drops the earliest memoized ones first.
pub struct HistoricalCache<V> {
    name: String,
    store: Arc<dyn HistoricalStore<V>>,
    provider: Arc<dyn AdjustKeyProvider>,
    interceptor: Option<Arc<dyn KeysQueryInterceptor>>,
    config: Config,
    memo: RwLock<Memo<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
    evictions: AtomicU64,
}

/// Memoized entries plus their insertion order.
struct Memo<V> {
    entries: BTreeMap<Timestamp, Arc<HistoricalEntry<V>>>,
    order: VecDeque<Timestamp>,
}

impl<V> Memo<V> {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            order: VecDeque::new(),
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert `entry`, then drop the oldest entries beyond `capacity`.
    /// Returns how many were dropped.
    fn insert(&mut self, entry: Arc<HistoricalEntry<V>>, capacity: usize) -> usize {
        self.order.push_back(entry.key());
        self.entries.insert(entry.key(), entry);

        let mut evicted = 0;
        while self.entries.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.order.clear();
        dropped
    }
}

impl<V> HistoricalCache<V> {
    pub(crate) fn new(
        name: String,
        store: Arc<dyn HistoricalStore<V>>,
        provider: Arc<dyn AdjustKeyProvider>,
        interceptor: Option<Arc<dyn KeysQueryInterceptor>>,
        config: Config,
    ) -> Self {
        Self {
            name,
            store,
            provider,
            interceptor,
            config,
            memo: RwLock::new(Memo::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clears: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &Arc<dyn AdjustKeyProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn HistoricalStore<V>> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            memoized: self.memo.read().len(),
        }
    }

    pub fn is_memoized(&self, key: Timestamp) -> bool {
        self.memo.read().entries.contains_key(&key)
    }

    pub(crate) fn interceptor(&self) -> Option<&dyn KeysQueryInterceptor> {
        self.interceptor.as_deref()
    }

    pub(crate) fn page_size(&self) -> usize {
        self.config.page_size
    }
}

impl<V: Send + Sync + 'static> HistoricalCache<V> {
    pub fn builder() -> HistoricalCacheBuilder<V> {
        HistoricalCacheBuilder::new()
    }

    /// Query under the configured future-value policy.
    pub fn query(&self) -> HistoricalQuery<'_, V> {
        HistoricalQuery::new(self, self.config.future_value_policy)
    }

    /// The entry for a key known to exist in the store.
    pub(crate) fn entry(&self, key: Timestamp) -> Arc<HistoricalEntry<V>> {
        if !self.config.entry_memo {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Arc::new(HistoricalEntry::lazy(key, self.store.clone()));
        }

        if let Some(entry) = self.memo.read().entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return entry.clone();
        }

        let mut memo = self.memo.write();
        if let Some(entry) = memo.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return entry.clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(HistoricalEntry::lazy(key, self.store.clone()));
        let evicted = memo.insert(entry.clone(), self.config.memo_capacity);
        drop(memo);
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            log::trace!("cache '{}' evicted {} memoized entries", self.name, evicted);
        }
        entry
    }
}

impl<V: Clone + Send + Sync + 'static> HistoricalCache<V> {
    /// Value in effect at `key` under the configured policy.
    pub fn get_value(&self, key: impl Into<AdjustedKey>) -> Result<Option<V>> {
        self.query().get_value(key)
    }
}

impl<V: Send + Sync + 'static> DependentCache for HistoricalCache<V> {
    fn clear(&self) {
        let dropped = self.memo.write().clear();
        self.clears.fetch_add(1, Ordering::Relaxed);
        log::debug!("cache '{}' cleared, dropped {} entries", self.name, dropped);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<V> std::fmt::Debug for HistoricalCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalCache")
            .field("name", &self.name)
            .field("provider", &self.provider.id())
            .field("intercepted", &self.interceptor.is_some())
            .field("config", &self.config)
            .finish()
    }
}
