//! Directional queries over a historical cache's key space.
//!
//! Every query clamps its key through the cache's provider, resolves the
//! target key against the store (or the installed interceptor), and vets the
//! terminal result with a [`FutureValuePolicy`].

mod interceptor;
mod policy;
mod sequence;

pub use interceptor::{Direction, Intercepted, KeysQueryInterceptor};
pub use policy::FutureValuePolicy;
pub use sequence::{NextEntries, NextValues};

use crate::adjust::AdjustedKey;
use crate::cache::HistoricalCache;
use crate::entry::HistoricalEntry;
use crate::error::{HorizonError, Result};
use crate::merge::DuplicateFilteringMergeList;
use horizon_types::Timestamp;
use std::sync::Arc;

/// A query against one [`HistoricalCache`] under one policy.
///
/// Keys may be plain [`Timestamp`]s or [`AdjustedKey`]s; a key already
/// clamped by the cache's provider under its current generation skips the
/// boundary lookup.
///
/// # Examples
///
/// ```rust
/// use horizon::prelude::*;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// for secs in [1, 2, 3, 4, 5] {
///     store.insert(Timestamp::from_secs(secs), secs * 10);
/// }
/// let provider = Arc::new(PullingAdjustKeyProvider::from_clock(Arc::new(|| Timestamp::from_secs(4))));
/// let cache = HistoricalCacheBuilder::new()
///     .store(store)
///     .provider(provider)
///     .build()?;
///
/// let query = cache.query();
/// assert_eq!(query.get_value(Timestamp::from_secs(9))?, Some(40));
/// assert_eq!(query.get_previous_value(Timestamp::from_secs(9), 2)?, Some(20));
/// # Ok::<(), horizon::HorizonError>(())
/// ```
pub struct HistoricalQuery<'a, V> {
    cache: &'a HistoricalCache<V>,
    policy: FutureValuePolicy,
}

impl<V> Clone for HistoricalQuery<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for HistoricalQuery<'_, V> {}

impl<'a, V: Send + Sync + 'static> HistoricalQuery<'a, V> {
    pub(crate) fn new(cache: &'a HistoricalCache<V>, policy: FutureValuePolicy) -> Self {
        Self { cache, policy }
    }

    pub fn with_policy(mut self, policy: FutureValuePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FutureValuePolicy {
        self.policy
    }

    /// Key of the entry in effect at `key`.
    pub fn get_key(&self, key: impl Into<AdjustedKey>) -> Result<Option<Timestamp>> {
        let adjusted = self.adjust(key)?;
        let found = self.cache.store().resolve_key(adjusted)?;
        self.vet(Some(adjusted), found)
    }

    pub fn get_entry(&self, key: impl Into<AdjustedKey>) -> Result<Option<Arc<HistoricalEntry<V>>>> {
        Ok(self.get_key(key)?.map(|found| self.entry(found)))
    }

    /// Key `shift_units` entries before the one in effect at `key`.
    ///
    /// Zero is the entry in effect at `key` itself. When fewer entries
    /// exist, the earliest reachable one is returned.
    pub fn get_previous_key(
        &self,
        key: impl Into<AdjustedKey>,
        shift_units: usize,
    ) -> Result<Option<Timestamp>> {
        let adjusted = self.adjust(key)?;
        let found = self.previous_step(adjusted, shift_units)?;
        self.vet(Some(adjusted), found)
    }

    pub fn get_previous_entry(
        &self,
        key: impl Into<AdjustedKey>,
        shift_units: usize,
    ) -> Result<Option<Arc<HistoricalEntry<V>>>> {
        Ok(self
            .get_previous_key(key, shift_units)?
            .map(|found| self.entry(found)))
    }

    /// Up to `shift_units` entries ending with the one in effect at `key`,
    /// oldest first.
    pub fn get_previous_entries(
        &self,
        key: impl Into<AdjustedKey>,
        shift_units: usize,
    ) -> Result<Vec<Arc<HistoricalEntry<V>>>> {
        require_positive("get_previous_entries", shift_units)?;
        let adjusted = self.adjust(key)?;

        let mut keys = if self.cache.interceptor().is_some() {
            self.step_back(adjusted, shift_units)?
        } else {
            self.walk_back(adjusted, shift_units - 1)?
        };

        if let Some(&newest) = keys.first()
            && self.policy.assert_entry(adjusted, newest)?.is_none()
        {
            return Ok(Vec::new());
        }

        keys.reverse();
        Ok(keys.into_iter().map(|found| self.entry(found)).collect())
    }

    /// Key `shift_units` entries after `key`.
    ///
    /// The result is vetted against the provider's current boundary.
    pub fn get_next_key(
        &self,
        key: impl Into<AdjustedKey>,
        shift_units: usize,
    ) -> Result<Option<Timestamp>> {
        require_positive("get_next_key", shift_units)?;
        let boundary = self.cache.provider().highest_allowed_key(true)?;
        let found = self.next_step(key.into().key(), shift_units)?;
        self.vet(boundary, found)
    }

    pub fn get_next_entry(
        &self,
        key: impl Into<AdjustedKey>,
        shift_units: usize,
    ) -> Result<Option<Arc<HistoricalEntry<V>>>> {
        Ok(self.get_next_key(key, shift_units)?.map(|found| self.entry(found)))
    }

    /// Lazy sequence of up to `shift_units` entries after `key`.
    pub fn get_next_entries(
        &self,
        key: impl Into<AdjustedKey>,
        shift_units: usize,
    ) -> Result<NextEntries<'a, V>> {
        require_positive("get_next_entries", shift_units)?;
        let boundary = self.cache.provider().highest_allowed_key(true)?;
        Ok(NextEntries::new(*self, key.into().key(), shift_units, boundary))
    }

    pub(crate) fn entry(&self, key: Timestamp) -> Arc<HistoricalEntry<V>> {
        self.cache.entry(key)
    }

    /// One page of keys after `cursor` for a lazy sequence.
    ///
    /// With an interceptor installed the sequence advances one key at a time
    /// so every step goes through it.
    pub(crate) fn next_page(&self, cursor: Timestamp, remaining: usize) -> Result<Vec<Timestamp>> {
        if self.cache.interceptor().is_some() {
            return Ok(self.next_step(cursor, 1)?.into_iter().collect());
        }
        self.fetch_after(cursor, remaining)
    }

    fn adjust(&self, key: impl Into<AdjustedKey>) -> Result<Timestamp> {
        Ok(self.cache.provider().maybe_adjust_key(key.into())?.key())
    }

    fn vet(&self, reference: Option<Timestamp>, found: Option<Timestamp>) -> Result<Option<Timestamp>> {
        match found {
            Some(found) => self.policy.assert_optional(reference, found),
            None => Ok(None),
        }
    }

    fn intercept(&self, direction: Direction, key: Timestamp, shift_units: usize) -> Result<Intercepted> {
        match self.cache.interceptor() {
            Some(interceptor) => interceptor.navigate(direction, key, shift_units),
            None => Ok(Intercepted::Pass),
        }
    }

    fn previous_step(&self, key: Timestamp, shift_units: usize) -> Result<Option<Timestamp>> {
        match self.intercept(Direction::Previous, key, shift_units)? {
            Intercepted::Key(found) => Ok(found),
            Intercepted::Pass => Ok(self.walk_back(key, shift_units)?.last().copied()),
        }
    }

    fn next_step(&self, key: Timestamp, shift_units: usize) -> Result<Option<Timestamp>> {
        match self.intercept(Direction::Next, key, shift_units)? {
            Intercepted::Key(found) => Ok(found),
            Intercepted::Pass => self.walk_forward(key, shift_units),
        }
    }

    /// Newest-first keys, one interceptor step at a time.
    fn step_back(&self, key: Timestamp, count: usize) -> Result<Vec<Timestamp>> {
        let mut keys = Vec::with_capacity(count);
        let Some(mut cursor) = self.previous_step(key, 0)? else {
            return Ok(keys);
        };
        keys.push(cursor);
        while keys.len() < count {
            match self.previous_step(cursor, 1)? {
                Some(found) if found < cursor => {
                    keys.push(found);
                    cursor = found;
                }
                _ => break,
            }
        }
        Ok(keys)
    }

    /// The entry in effect at `key` followed by up to `steps` earlier keys,
    /// newest first.
    fn walk_back(&self, key: Timestamp, steps: usize) -> Result<Vec<Timestamp>> {
        let store = self.cache.store();
        let Some(start) = store.resolve_key(key)? else {
            return Ok(Vec::new());
        };

        let wanted = steps.saturating_add(1);
        // Pages overlap by the cursor key.
        let limit = self.cache.page_size().saturating_add(1);
        let mut merged = DuplicateFilteringMergeList::with_capacity(wanted.min(limit));
        let mut cursor = start;
        loop {
            let page = store.keys_before(cursor, limit)?;
            log::trace!("paged {} keys at or before {}", page.len(), cursor);
            let exhausted = page.len() < limit;
            let added = merged.add_batch(page)?;
            if merged.len() >= wanted || exhausted || added == 0 {
                break;
            }
            match merged.min_entry() {
                Some(&oldest) if oldest < cursor => cursor = oldest,
                _ => break,
            }
        }

        let mut keys = merged.into_vec();
        keys.truncate(wanted);
        Ok(keys)
    }

    fn walk_forward(&self, key: Timestamp, steps: usize) -> Result<Option<Timestamp>> {
        let mut merged = DuplicateFilteringMergeList::with_capacity(steps.min(self.cache.page_size()));
        let mut cursor = key;
        while merged.len() < steps {
            let page = self.fetch_after(cursor, steps - merged.len())?;
            let Some(&last) = page.last() else {
                break;
            };
            if merged.add_batch(page)? == 0 || last <= cursor {
                break;
            }
            cursor = last;
        }
        Ok(merged.iter().nth(steps - 1).copied())
    }

    fn fetch_after(&self, cursor: Timestamp, remaining: usize) -> Result<Vec<Timestamp>> {
        let limit = remaining.min(self.cache.page_size());
        let page = self.cache.store().keys_after(cursor, limit)?;
        log::trace!("paged {} keys after {}", page.len(), cursor);
        Ok(page)
    }
}

impl<V: Clone + Send + Sync + 'static> HistoricalQuery<'_, V> {
    /// Value of the entry in effect at `key`.
    pub fn get_value(&self, key: impl Into<AdjustedKey>) -> Result<Option<V>> {
        self.get_entry(key)?.map(|entry| entry.value().cloned()).transpose()
    }

    pub fn get_previous_value(&self, key: impl Into<AdjustedKey>, shift_units: usize) -> Result<Option<V>> {
        self.get_previous_entry(key, shift_units)?
            .map(|entry| entry.value().cloned())
            .transpose()
    }

    pub fn get_next_value(&self, key: impl Into<AdjustedKey>, shift_units: usize) -> Result<Option<V>> {
        self.get_next_entry(key, shift_units)?
            .map(|entry| entry.value().cloned())
            .transpose()
    }
}

impl<'a, V: Clone + Send + Sync + 'static> HistoricalQuery<'a, V> {
    /// Lazy sequence of the values of up to `shift_units` entries after `key`.
    pub fn get_next_values(&self, key: impl Into<AdjustedKey>, shift_units: usize) -> Result<NextValues<'a, V>> {
        Ok(NextValues::new(self.get_next_entries(key, shift_units)?))
    }
}

impl<V> std::fmt::Debug for HistoricalQuery<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalQuery")
            .field("cache", &self.cache.name())
            .field("policy", &self.policy)
            .finish()
    }
}

fn require_positive(operation: &str, shift_units: usize) -> Result<()> {
    if shift_units == 0 {
        return Err(HorizonError::precondition(format!(
            "{operation} requires shift_units >= 1"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjust::{ClockSource, GuardMode, PullingAdjustKeyProvider};
    use crate::builder::HistoricalCacheBuilder;
    use crate::config::Config;
    use crate::storage::MemoryStore;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn cache_at(now: i64, keys: &[i64], page_size: usize) -> Arc<HistoricalCache<i64>> {
        let store = Arc::new(MemoryStore::new());
        for k in keys {
            store.insert(ts(*k), *k * 100);
        }
        let provider = PullingAdjustKeyProvider::with_mode(
            Arc::new(ClockSource::new(Arc::new(move || ts(now)))),
            GuardMode::NonRecursive,
        );
        HistoricalCacheBuilder::new()
            .store(store)
            .provider(Arc::new(provider))
            .config(Config::default().with_page_size(page_size))
            .build()
            .unwrap()
    }

    #[test]
    fn test_get_key_clamps_to_boundary() {
        let cache = cache_at(30, &[10, 20, 30, 40], 8);
        let query = cache.query();
        assert_eq!(query.get_key(ts(35)).unwrap(), Some(ts(30)));
        assert_eq!(query.get_key(ts(1000)).unwrap(), Some(ts(30)));
        assert_eq!(query.get_value(ts(25)).unwrap(), Some(2000));
    }

    #[test]
    fn test_previous_walks_across_pages() {
        let keys: Vec<i64> = (1..=20).collect();
        let cache = cache_at(100, &keys, 3);
        let query = cache.query();

        assert_eq!(query.get_previous_key(ts(15), 0).unwrap(), Some(ts(15)));
        assert_eq!(query.get_previous_key(ts(15), 1).unwrap(), Some(ts(14)));
        assert_eq!(query.get_previous_key(ts(15), 9).unwrap(), Some(ts(6)));
        assert_eq!(query.get_previous_key(ts(15), 50).unwrap(), Some(ts(1)));
    }

    #[test]
    fn test_previous_entries_are_oldest_first() {
        let keys: Vec<i64> = (1..=10).collect();
        let cache = cache_at(100, &keys, 2);

        let entries = cache.query().get_previous_entries(ts(7), 4).unwrap();
        let found: Vec<Timestamp> = entries.iter().map(|e| e.key()).collect();
        assert_eq!(found, vec![ts(4), ts(5), ts(6), ts(7)]);

        let short = cache.query().get_previous_entries(ts(2), 5).unwrap();
        assert_eq!(short.len(), 2);
    }

    #[test]
    fn test_next_key_respects_shift() {
        let cache = cache_at(100, &[1, 2, 3, 4, 5], 2);
        let query = cache.query();
        assert_eq!(query.get_next_key(ts(0), 1).unwrap(), Some(ts(1)));
        assert_eq!(query.get_next_key(ts(0), 5).unwrap(), Some(ts(5)));
        assert_eq!(query.get_next_key(ts(0), 6).unwrap(), None);
        assert_eq!(query.get_next_key(ts(3), 1).unwrap(), Some(ts(4)));
    }

    #[test]
    fn test_zero_shift_is_precondition_error() {
        let cache = cache_at(100, &[1, 2, 3], 4);
        let query = cache.query();
        assert!(matches!(
            query.get_next_key(ts(0), 0),
            Err(HorizonError::Precondition(_))
        ));
        assert!(query.get_previous_entries(ts(3), 0).is_err());
        assert!(query.get_next_entries(ts(0), 0).is_err());
    }

    #[test]
    fn test_next_beyond_boundary_follows_policy() {
        let cache = cache_at(3, &[1, 2, 3, 4, 5], 4);
        let query = cache.query();

        assert!(matches!(
            query.get_next_key(ts(3), 1),
            Err(HorizonError::InvariantViolation { .. })
        ));
        assert_eq!(
            query
                .with_policy(FutureValuePolicy::WithFutureNull)
                .get_next_key(ts(3), 1)
                .unwrap(),
            None
        );
        assert_eq!(
            query
                .with_policy(FutureValuePolicy::WithFuture)
                .get_next_value(ts(3), 1)
                .unwrap(),
            Some(400)
        );
    }

    #[test]
    fn test_interceptor_overrides_navigation() {
        let store = Arc::new(MemoryStore::new());
        for k in 1..=5 {
            store.insert(ts(k), k);
        }
        // Navigation over even keys only.
        let interceptor = |direction: Direction, key: Timestamp, shift: usize| -> Result<Intercepted> {
            let secs = key.as_nanos() / 1_000_000_000;
            let base = secs - secs.rem_euclid(2);
            let target = match direction {
                Direction::Previous => base - 2 * shift as i64,
                Direction::Next => base + 2 * shift as i64,
            };
            Ok(Intercepted::Key(
                (2..=4).contains(&target).then(|| ts(target)),
            ))
        };
        let cache = HistoricalCacheBuilder::new()
            .store(store)
            .provider(Arc::new(PullingAdjustKeyProvider::from_clock(Arc::new(|| ts(100)))))
            .interceptor(Arc::new(interceptor))
            .build()
            .unwrap();
        let query = cache.query();

        assert_eq!(query.get_previous_key(ts(5), 0).unwrap(), Some(ts(4)));
        assert_eq!(query.get_previous_key(ts(5), 1).unwrap(), Some(ts(2)));
        assert_eq!(query.get_next_key(ts(1), 1).unwrap(), Some(ts(2)));
        assert_eq!(query.get_next_key(ts(4), 1).unwrap(), None);
        assert_eq!(query.get_next_key(ts(2), 1).unwrap(), Some(ts(4)));

        let previous: Vec<Timestamp> = query
            .get_previous_entries(ts(5), 3)
            .unwrap()
            .iter()
            .map(|e| e.key())
            .collect();
        assert_eq!(previous, vec![ts(2), ts(4)]);

        let next: Vec<i64> = query.get_next_values(ts(2), 3).unwrap().map(|v| v.unwrap()).collect();
        assert_eq!(next, vec![4]);
    }

    #[test]
    fn test_tagged_key_skips_readjustment() {
        let cache = cache_at(30, &[10, 20, 30, 40], 8);
        let provider = cache.provider().clone();
        let query = cache.query();

        // Vouched for by the provider, so the boundary is not applied again.
        let vouched = provider.new_already_adjusted_key(ts(40));
        assert_eq!(query.get_key(vouched).unwrap(), Some(ts(40)));
        assert_eq!(query.get_key(AdjustedKey::untagged(ts(40))).unwrap(), Some(ts(30)));
    }
}
