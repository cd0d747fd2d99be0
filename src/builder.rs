//! Builder for historical caches
//!
//! Wires a store, an adjust-key provider and an optional interceptor into a
//! [`HistoricalCache`] and registers the cache with its provider.

use crate::adjust::{AdjustKeyProvider, ClockSource, DependentCache, PullingAdjustKeyProvider};
use crate::cache::HistoricalCache;
use crate::config::Config;
use crate::error::{HorizonError, Result};
use crate::query::KeysQueryInterceptor;
use crate::storage::HistoricalStore;
use std::path::Path;
use std::sync::{Arc, Weak};

/// Builder for [`HistoricalCache`].
///
/// Without an explicit provider the cache gets a pull provider on the system
/// clock, guarded according to the config's `guard_mode`.
pub struct HistoricalCacheBuilder<V> {
    name: Option<String>,
    store: Option<Arc<dyn HistoricalStore<V>>>,
    provider: Option<Arc<dyn AdjustKeyProvider>>,
    interceptor: Option<Arc<dyn KeysQueryInterceptor>>,
    config: Config,
}

impl<V: Send + Sync + 'static> HistoricalCacheBuilder<V> {
    pub fn new() -> Self {
        Self {
            name: None,
            store: None,
            provider: None,
            interceptor: None,
            config: Config::default(),
        }
    }

    /// Set the store the cache reads from. Required.
    pub fn store<S: HistoricalStore<V> + 'static>(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set a store that is already type-erased.
    pub fn shared_store(mut self, store: Arc<dyn HistoricalStore<V>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the provider owning the cache's highest allowed key.
    pub fn provider(mut self, provider: Arc<dyn AdjustKeyProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn KeysQueryInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Load the config from a JSON or TOML file.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = Config::from_path(path)?;
        Ok(self)
    }

    /// Label used in logs and by [`DependentCache::name`].
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Build the cache and register it with its provider.
    pub fn build(self) -> Result<Arc<HistoricalCache<V>>> {
        self.config.validate().map_err(HorizonError::Config)?;
        let store = self
            .store
            .ok_or_else(|| HorizonError::Config("a historical cache needs a store".to_string()))?;

        let provider: Arc<dyn AdjustKeyProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(PullingAdjustKeyProvider::with_mode(
                Arc::new(ClockSource::system()),
                self.config.guard_mode,
            )),
        };
        let name = self
            .name
            .unwrap_or_else(|| format!("cache-{}", provider.id().as_u64()));

        let cache = Arc::new(HistoricalCache::new(
            name,
            store,
            provider,
            self.interceptor,
            self.config,
        ));

        let dependent: Weak<dyn DependentCache> = Arc::downgrade(&cache) as Weak<dyn DependentCache>;
        cache.provider().register_historical_cache(dependent);
        log::debug!(
            "built historical cache '{}' on {}",
            cache.name(),
            cache.provider().id()
        );

        Ok(cache)
    }
}

impl<V: Send + Sync + 'static> Default for HistoricalCacheBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}
