//! Boundary-aware historical cache core.
//!
//! An adjust-key provider owns the highest key a cache hierarchy may serve and
//! clamps every key handed to it; historical caches query their store through
//! that clamp and vet what they find with a future-value policy.
//!
//! ```rust
//! use horizon::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert(Timestamp::from_secs(10), "open");
//! store.insert(Timestamp::from_secs(20), "close");
//!
//! let provider = Arc::new(PushingAdjustKeyProvider::from_clock(Arc::new(SystemClock)));
//! let cache = HistoricalCacheBuilder::new()
//!     .store(store)
//!     .provider(provider.clone())
//!     .build()?;
//!
//! // Replay: the driver decides how far the cache may look.
//! provider.push_highest_allowed_key(Some(Timestamp::from_secs(15)));
//! assert_eq!(cache.get_value(Timestamp::from_secs(30))?, Some("open"));
//! # Ok::<(), horizon::HorizonError>(())
//! ```

pub mod adjust;
pub mod builder;
pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod merge;
pub mod query;
pub mod storage;

pub use adjust::{
    AdjustKeyProvider, AdjustedKey, AdjustmentTag, DependentCache, GuardMode, ProviderId,
    PullingAdjustKeyProvider, PushingAdjustKeyProvider, RecursionGuard,
    is_global_already_adjusting_key,
};
pub use builder::HistoricalCacheBuilder;
pub use cache::{CacheStats, HistoricalCache};
pub use config::Config;
pub use entry::HistoricalEntry;
pub use error::{HorizonError, Result};
pub use merge::{DuplicateFilteringMergeList, Keyed, Orientation};
pub use query::{
    Direction, FutureValuePolicy, HistoricalQuery, Intercepted, KeysQueryInterceptor,
    NextEntries, NextValues,
};
pub use storage::{HistoricalStore, MemoryStore, StoreStats};

pub use horizon_types::{TimeUnit, Timestamp};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{HistoricalCacheBuilder, HorizonError, Result};

    pub use crate::adjust::{
        AdjustKeyProvider, ClockSource, DependentCache, GuardMode, PullingAdjustKeyProvider,
        PushingAdjustKeyProvider, SystemClock, TimeSource,
    };

    pub use crate::{Config, FutureValuePolicy, HistoricalCache, HistoricalQuery};

    pub use crate::{HistoricalStore, MemoryStore};

    pub use horizon_types::{TimeUnit, Timestamp};
}
