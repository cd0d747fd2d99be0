//! Adjust-key providers: the "highest allowed key" of a cache hierarchy.
//!
//! A provider owns the boundary up to which its caches may answer queries and
//! clamps every key handed to it against that boundary. Two strategies exist:
//!
//! - [`PullingAdjustKeyProvider`] computes the boundary on demand from an
//!   upstream [`BoundarySource`] (a clock or a parent provider)
//! - [`PushingAdjustKeyProvider`] receives the boundary from an external
//!   driver and behaves like a pull provider until the first push arrives
//!
//! Dependent caches register with their provider and are cleared when the
//! boundary first becomes defined.

use crate::error::Result;
use horizon_types::Timestamp;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Weak;

mod guard;
mod key;
mod pull;
mod push;
mod source;

pub use guard::{GuardMode, GuardTicket, RecursionGuard, is_global_already_adjusting_key};
pub use key::{AdjustedKey, AdjustmentTag, ProviderId};
pub use pull::PullingAdjustKeyProvider;
pub use push::PushingAdjustKeyProvider;
pub use source::{
    BoundarySource, ClockSource, EarliestOf, ParentSource, SystemClock, TimeSource,
};

/// A cache whose derived state depends on a provider's boundary.
pub trait DependentCache: Send + Sync {
    /// Drop any state computed under a previous boundary.
    fn clear(&self);

    /// Label used in log messages.
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Owner of the highest allowed key for one cache hierarchy.
///
/// Clamping never rejects a key: a key beyond the boundary is pulled back to
/// the boundary, and a key is left untouched while no boundary is known.
pub trait AdjustKeyProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Current tag generation. Changes whenever previously clamped keys may no
    /// longer be within the boundary.
    fn generation(&self) -> u64;

    /// The highest key caches may serve, or `None` if no boundary is known.
    ///
    /// `update` asks the provider to remember the computed value as its last
    /// known boundary.
    fn highest_allowed_key(&self, update: bool) -> Result<Option<Timestamp>>;

    /// Boundary in effect before the latest change.
    fn previous_highest_allowed_key(&self) -> Option<Timestamp>;

    /// Register a cache to be cleared when the boundary first becomes defined.
    fn register_historical_cache(&self, dependent: Weak<dyn DependentCache>);

    /// Reset cascade bookkeeping. The boundary itself is never reset here.
    fn clear(&self);

    /// Whether this provider is currently computing its boundary.
    fn is_already_adjusting_key(&self) -> bool;

    fn tag(&self) -> AdjustmentTag {
        AdjustmentTag {
            provider: self.id(),
            generation: self.generation(),
        }
    }

    /// Clamp `key` to the highest allowed key and tag it with this provider.
    fn adjust_key(&self, key: Timestamp) -> Result<AdjustedKey> {
        // Read the tag first so a concurrent retreat leaves the result stale.
        let tag = self.tag();
        let boundary = self.highest_allowed_key(true)?;
        Ok(AdjustedKey::tagged(clamp(key, boundary), tag))
    }

    /// Clamp `key` unless this provider already did under the current
    /// generation.
    fn maybe_adjust_key(&self, key: AdjustedKey) -> Result<AdjustedKey> {
        if self.is_adjusted_key(&key) {
            Ok(key)
        } else {
            self.adjust_key(key.key())
        }
    }

    fn is_adjusted_key(&self, key: &AdjustedKey) -> bool {
        key.is_tagged_by(self.tag())
    }

    /// Tag `key` as already clamped without consulting the boundary.
    fn new_already_adjusted_key(&self, key: Timestamp) -> AdjustedKey {
        AdjustedKey::tagged(key, self.tag())
    }
}

pub(crate) fn clamp(key: Timestamp, boundary: Option<Timestamp>) -> Timestamp {
    match boundary {
        Some(boundary) if key > boundary => boundary,
        _ => key,
    }
}

/// Whether keys clamped under `old` may lie beyond `new`.
pub(crate) fn boundary_retreated(old: Option<Timestamp>, new: Option<Timestamp>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => new < old,
        (None, None) => false,
        _ => true,
    }
}

const UNSET: i64 = i64::MIN;

/// Lock-free cell holding an optional timestamp.
///
/// `i64::MIN` is never a valid timestamp and encodes `None`.
#[derive(Debug)]
pub(crate) struct AtomicTimestamp(AtomicI64);

impl AtomicTimestamp {
    pub(crate) fn new(value: Option<Timestamp>) -> Self {
        Self(AtomicI64::new(Self::encode(value)))
    }

    pub(crate) fn load(&self) -> Option<Timestamp> {
        Self::decode(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, value: Option<Timestamp>) {
        self.0.store(Self::encode(value), Ordering::Release);
    }

    pub(crate) fn swap(&self, value: Option<Timestamp>) -> Option<Timestamp> {
        Self::decode(self.0.swap(Self::encode(value), Ordering::AcqRel))
    }

    fn encode(value: Option<Timestamp>) -> i64 {
        value.map_or(UNSET, Timestamp::as_nanos)
    }

    fn decode(raw: i64) -> Option<Timestamp> {
        (raw != UNSET).then(|| Timestamp::from_nanos(raw))
    }
}

/// Dependents registered with a provider, keyed by allocation address.
#[derive(Default)]
pub(crate) struct Registrations {
    closed: bool,
    dependents: FxHashMap<usize, Weak<dyn DependentCache>>,
}

impl Registrations {
    fn address(dependent: &Weak<dyn DependentCache>) -> usize {
        dependent.as_ptr() as *const () as usize
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn len(&self) -> usize {
        self.dependents.len()
    }

    /// Returns `false` if the dependent was already registered.
    pub(crate) fn insert(&mut self, dependent: Weak<dyn DependentCache>) -> bool {
        self.dependents.retain(|_, d| d.strong_count() > 0);
        self.dependents
            .insert(Self::address(&dependent), dependent)
            .is_none()
    }

    /// Take every registration and refuse new ones from now on.
    pub(crate) fn close(&mut self) -> Vec<Weak<dyn DependentCache>> {
        self.closed = true;
        std::mem::take(&mut self.dependents).into_values().collect()
    }

    /// Live dependents, leaving the registrations in place.
    pub(crate) fn live(&mut self) -> Vec<Weak<dyn DependentCache>> {
        self.dependents.retain(|_, d| d.strong_count() > 0);
        self.dependents.values().cloned().collect()
    }
}

/// Clear every dependent that is still alive. Returns how many were cleared.
pub(crate) fn notify_dependents(
    provider: ProviderId,
    dependents: Vec<Weak<dyn DependentCache>>,
) -> usize {
    let mut cleared = 0;
    for dependent in dependents {
        match dependent.upgrade() {
            Some(cache) => {
                log::trace!("{} clearing dependent cache '{}'", provider, cache.name());
                cache.clear();
                cleared += 1;
            }
            None => {
                log::debug!("{} skipped a dependent dropped before clear", provider);
            }
        }
    }
    cleared
}

pub(crate) fn clear_now(provider: ProviderId, dependent: &Weak<dyn DependentCache>) {
    if let Some(cache) = dependent.upgrade() {
        log::trace!("{} clearing late dependent '{}'", provider, cache.name());
        cache.clear();
    }
}
