//! Pull-based provider: the boundary is computed on demand from upstream.

use super::{
    AdjustKeyProvider, AtomicTimestamp, BoundarySource, ClockSource, DependentCache, GuardMode,
    ProviderId, RecursionGuard, Registrations, TimeSource, boundary_retreated, notify_dependents,
};
use crate::error::Result;
use horizon_types::Timestamp;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Provider that asks an upstream [`BoundarySource`] for the boundary every
/// time it is needed.
///
/// In [`GuardMode::Recursive`] the upstream query runs while holding a
/// [`RecursionGuard`]. A nested call made on the same thread while the guard
/// is held, whether by this provider or another one sharing the guard,
/// returns the last boundary remembered through `highest_allowed_key(true)`
/// instead of recursing. Calls on other threads are never nested and always
/// reach the source.
///
/// # Examples
///
/// ```rust
/// use horizon::adjust::{AdjustKeyProvider, PullingAdjustKeyProvider};
/// use horizon::Timestamp;
/// use std::sync::Arc;
///
/// let provider = PullingAdjustKeyProvider::from_clock(Arc::new(|| Timestamp::from_secs(100)));
/// let adjusted = provider.adjust_key(Timestamp::from_secs(250))?;
/// assert_eq!(adjusted.key(), Timestamp::from_secs(100));
/// # Ok::<(), horizon::HorizonError>(())
/// ```
pub struct PullingAdjustKeyProvider {
    id: ProviderId,
    source: Arc<dyn BoundarySource>,
    mode: GuardMode,
    guard: &'static RecursionGuard,
    last_known: AtomicTimestamp,
    previous: AtomicTimestamp,
    in_flight: AtomicUsize,
    generation: AtomicU64,
    dependents: Mutex<Registrations>,
}

impl PullingAdjustKeyProvider {
    /// Recursive provider on the process-wide guard.
    pub fn new(source: Arc<dyn BoundarySource>) -> Self {
        Self::with_mode(source, GuardMode::Recursive)
    }

    pub fn with_mode(source: Arc<dyn BoundarySource>, mode: GuardMode) -> Self {
        Self {
            id: ProviderId::next(),
            source,
            mode,
            guard: RecursionGuard::global(),
            last_known: AtomicTimestamp::new(None),
            previous: AtomicTimestamp::new(None),
            in_flight: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            dependents: Mutex::new(Registrations::default()),
        }
    }

    /// Provider rooted at a clock.
    pub fn from_clock(clock: Arc<dyn TimeSource>) -> Self {
        Self::new(Arc::new(ClockSource::new(clock)))
    }

    /// Provider whose boundary follows `parent`.
    pub fn from_parent(parent: Arc<dyn AdjustKeyProvider>) -> Self {
        Self::new(Arc::new(super::ParentSource::new(parent)))
    }

    /// Use `guard` instead of the process-wide one.
    pub fn with_guard(mut self, guard: &'static RecursionGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    /// Last boundary remembered by an updating call.
    pub fn last_known_highest_allowed_key(&self) -> Option<Timestamp> {
        self.last_known.load()
    }

    fn compute(&self, update: bool) -> Result<Option<Timestamp>> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let result = self.source.current_boundary(update);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        let boundary = result?;
        if update {
            self.remember(boundary);
        }
        Ok(boundary)
    }

    fn remember(&self, boundary: Option<Timestamp>) {
        let old = self.last_known.swap(boundary);
        if old != boundary {
            self.previous.store(old);
            if boundary_retreated(old, boundary) {
                self.generation.fetch_add(1, Ordering::AcqRel);
            }
        }
    }
}

impl AdjustKeyProvider for PullingAdjustKeyProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn highest_allowed_key(&self, update: bool) -> Result<Option<Timestamp>> {
        match self.mode {
            GuardMode::NonRecursive => self.compute(update),
            GuardMode::Recursive => {
                let Some(_ticket) = self.guard.try_enter() else {
                    let fallback = self.last_known.load();
                    log::trace!(
                        "{} short-circuited nested boundary query, answering {:?}",
                        self.id,
                        fallback
                    );
                    return Ok(fallback);
                };
                self.compute(update)
            }
        }
    }

    fn previous_highest_allowed_key(&self) -> Option<Timestamp> {
        self.previous.load()
    }

    fn register_historical_cache(&self, dependent: Weak<dyn DependentCache>) {
        self.dependents.lock().insert(dependent);
    }

    fn clear(&self) {
        let dependents = self.dependents.lock().live();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let cleared = notify_dependents(self.id, dependents);
        log::debug!("{} cleared, notified {} dependents", self.id, cleared);
    }

    fn is_already_adjusting_key(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }
}

impl std::fmt::Debug for PullingAdjustKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullingAdjustKeyProvider")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("last_known", &self.last_known.load())
            .field("generation", &self.generation())
            .finish()
    }
}
