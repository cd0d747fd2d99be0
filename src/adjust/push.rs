//! Push-based provider: the boundary is set explicitly by an external driver.

use super::{
    AdjustKeyProvider, AtomicTimestamp, BoundarySource, DependentCache, ProviderId,
    PullingAdjustKeyProvider, Registrations, TimeSource, boundary_retreated, clear_now,
    notify_dependents,
};
use crate::error::Result;
use horizon_types::Timestamp;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Provider whose boundary is pushed by a driver such as a clock tick or a
/// market-data feed.
///
/// Until the first push it answers like the pull provider it wraps, so the
/// same caches run unchanged in live mode and in replay. The first push that
/// defines a boundary clears every registered dependent exactly once; caches
/// registering after that point are cleared on the spot.
///
/// Readers never block on the driver: both boundary cells are lock-free.
///
/// # Examples
///
/// ```rust
/// use horizon::adjust::{AdjustKeyProvider, PushingAdjustKeyProvider};
/// use horizon::Timestamp;
/// use std::sync::Arc;
///
/// let provider = PushingAdjustKeyProvider::from_clock(Arc::new(|| Timestamp::from_secs(1_000)));
/// provider.push_highest_allowed_key(Some(Timestamp::from_secs(10)));
/// provider.push_highest_allowed_key(Some(Timestamp::from_secs(20)));
///
/// assert_eq!(provider.highest_allowed_key(false)?, Some(Timestamp::from_secs(20)));
/// assert_eq!(provider.previous_highest_allowed_key(), Some(Timestamp::from_secs(10)));
/// assert_eq!(provider.adjust_key(Timestamp::from_secs(99))?.key(), Timestamp::from_secs(20));
/// # Ok::<(), horizon::HorizonError>(())
/// ```
pub struct PushingAdjustKeyProvider {
    id: ProviderId,
    current: AtomicTimestamp,
    previous: AtomicTimestamp,
    pushed: AtomicBool,
    generation: AtomicU64,
    registrations: Mutex<Registrations>,
    fallback: PullingAdjustKeyProvider,
}

impl PushingAdjustKeyProvider {
    /// Wrap `fallback`, which answers until the first push.
    pub fn new(fallback: PullingAdjustKeyProvider) -> Self {
        Self {
            id: ProviderId::next(),
            current: AtomicTimestamp::new(None),
            previous: AtomicTimestamp::new(None),
            pushed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            registrations: Mutex::new(Registrations::default()),
            fallback,
        }
    }

    pub fn from_source(source: Arc<dyn BoundarySource>) -> Self {
        Self::new(PullingAdjustKeyProvider::new(source))
    }

    pub fn from_clock(clock: Arc<dyn TimeSource>) -> Self {
        Self::new(PullingAdjustKeyProvider::from_clock(clock))
    }

    /// Publish a new boundary.
    ///
    /// The value in effect before the call becomes the previous boundary. When
    /// the boundary goes from unset to set for the first time, registered
    /// dependents are taken out of the registration set and cleared.
    pub fn push_highest_allowed_key(&self, boundary: Option<Timestamp>) {
        let (prior, cascade) = {
            let mut registrations = self.registrations.lock();
            let prior = self.current.load();
            self.previous.store(prior);
            self.current.store(boundary);
            self.pushed.store(true, Ordering::Release);
            if boundary_retreated(prior, boundary) {
                self.generation.fetch_add(1, Ordering::AcqRel);
            }

            let first_set = prior.is_none() && boundary.is_some() && !registrations.is_closed();
            (prior, first_set.then(|| registrations.close()))
        };

        log::debug!(
            "{} pushed highest allowed key {:?} (previous {:?})",
            self.id,
            boundary,
            prior
        );

        if let Some(dependents) = cascade {
            self.finish_clear(dependents);
        }
    }

    /// The pushed boundary, ignoring the fallback provider.
    pub fn current_highest_allowed_key(&self) -> Option<Timestamp> {
        self.current.load()
    }

    pub fn has_pushed(&self) -> bool {
        self.pushed.load(Ordering::Acquire)
    }

    /// Whether the latest push moved the boundary.
    pub fn boundary_changed(&self) -> bool {
        self.current.load() != self.previous.load()
    }

    /// Number of dependents still waiting for the first cascade.
    pub fn pending_registrations(&self) -> usize {
        self.registrations.lock().len()
    }

    pub fn fallback(&self) -> &PullingAdjustKeyProvider {
        &self.fallback
    }

    fn finish_clear(&self, dependents: Vec<Weak<dyn DependentCache>>) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.fallback.clear();
        let cleared = notify_dependents(self.id, dependents);
        log::debug!("{} cascade cleared {} dependents", self.id, cleared);
    }
}

impl AdjustKeyProvider for PushingAdjustKeyProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn highest_allowed_key(&self, update: bool) -> Result<Option<Timestamp>> {
        if self.has_pushed() {
            Ok(self.current.load())
        } else {
            self.fallback.highest_allowed_key(update)
        }
    }

    fn previous_highest_allowed_key(&self) -> Option<Timestamp> {
        if self.has_pushed() {
            self.previous.load()
        } else {
            self.fallback.previous_highest_allowed_key()
        }
    }

    fn register_historical_cache(&self, dependent: Weak<dyn DependentCache>) {
        let mut registrations = self.registrations.lock();
        if registrations.is_closed() {
            drop(registrations);
            clear_now(self.id, &dependent);
        } else {
            registrations.insert(dependent);
        }
    }

    /// Once a boundary exists this runs the one-time cascade; before that,
    /// registered dependents are cleared but stay registered for the first
    /// push.
    fn clear(&self) {
        let dependents = {
            let mut registrations = self.registrations.lock();
            if self.current.load().is_some() {
                registrations.close()
            } else {
                registrations.live()
            }
        };
        self.finish_clear(dependents);
    }

    fn is_already_adjusting_key(&self) -> bool {
        self.fallback.is_already_adjusting_key()
    }
}

impl std::fmt::Debug for PushingAdjustKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushingAdjustKeyProvider")
            .field("id", &self.id)
            .field("current", &self.current.load())
            .field("previous", &self.previous.load())
            .field("pushed", &self.has_pushed())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjust::{GuardMode, RecursionGuard};
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        clears: AtomicUsize,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                clears: AtomicUsize::new(0),
            })
        }

        fn clears(&self) -> usize {
            self.clears.load(Ordering::SeqCst)
        }
    }

    impl DependentCache for Counting {
        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn weak(cache: &Arc<Counting>) -> Weak<dyn DependentCache> {
        Arc::downgrade(cache) as Weak<dyn DependentCache>
    }

    fn provider() -> PushingAdjustKeyProvider {
        let clock: Arc<dyn TimeSource> = Arc::new(|| Timestamp::from_secs(500));
        PushingAdjustKeyProvider::new(PullingAdjustKeyProvider::with_mode(
            Arc::new(crate::adjust::ClockSource::new(clock)),
            GuardMode::NonRecursive,
        ))
    }

    #[test]
    fn test_falls_back_until_first_push() {
        let provider = provider();
        assert!(!provider.has_pushed());
        assert_eq!(
            provider.highest_allowed_key(true).unwrap(),
            Some(Timestamp::from_secs(500))
        );

        provider.push_highest_allowed_key(Some(Timestamp::from_secs(3)));
        assert_eq!(
            provider.highest_allowed_key(true).unwrap(),
            Some(Timestamp::from_secs(3))
        );
        assert_eq!(provider.previous_highest_allowed_key(), None);
    }

    #[test]
    fn test_push_tracks_previous() {
        let provider = provider();
        provider.push_highest_allowed_key(Some(Timestamp::from_secs(1)));
        provider.push_highest_allowed_key(Some(Timestamp::from_secs(2)));

        assert_eq!(
            provider.previous_highest_allowed_key(),
            Some(Timestamp::from_secs(1))
        );
        assert_eq!(
            provider.current_highest_allowed_key(),
            Some(Timestamp::from_secs(2))
        );
        assert!(provider.boundary_changed());

        provider.push_highest_allowed_key(Some(Timestamp::from_secs(2)));
        assert!(!provider.boundary_changed());
    }

    #[test]
    fn test_first_push_clears_each_dependent_once() {
        let provider = provider();
        let a = Counting::new();
        let b = Counting::new();
        provider.register_historical_cache(weak(&a));
        provider.register_historical_cache(weak(&b));
        provider.register_historical_cache(weak(&a));
        assert_eq!(provider.pending_registrations(), 2);

        provider.push_highest_allowed_key(Some(Timestamp::from_secs(10)));
        assert_eq!((a.clears(), b.clears()), (1, 1));
        assert_eq!(provider.pending_registrations(), 0);

        provider.push_highest_allowed_key(Some(Timestamp::from_secs(11)));
        provider.push_highest_allowed_key(None);
        provider.push_highest_allowed_key(Some(Timestamp::from_secs(12)));
        assert_eq!((a.clears(), b.clears()), (1, 1));
    }

    #[test]
    fn test_pushing_none_first_does_not_cascade() {
        let provider = provider();
        let a = Counting::new();
        provider.register_historical_cache(weak(&a));

        provider.push_highest_allowed_key(None);
        assert_eq!(a.clears(), 0);
        assert_eq!(provider.highest_allowed_key(true).unwrap(), None);
        assert_eq!(provider.adjust_key(Timestamp::MAX).unwrap().key(), Timestamp::MAX);

        provider.push_highest_allowed_key(Some(Timestamp::from_secs(1)));
        assert_eq!(a.clears(), 1);
    }

    #[test]
    fn test_late_registration_is_cleared_immediately() {
        let provider = provider();
        provider.push_highest_allowed_key(Some(Timestamp::from_secs(10)));

        let late = Counting::new();
        provider.register_historical_cache(weak(&late));
        assert_eq!(late.clears(), 1);
        assert_eq!(provider.pending_registrations(), 0);
    }

    #[test]
    fn test_reentrant_registration_during_cascade() {
        struct Reregistering {
            provider: Arc<PushingAdjustKeyProvider>,
            me: parking_lot::Mutex<Option<Weak<dyn DependentCache>>>,
            clears: AtomicUsize,
        }

        impl DependentCache for Reregistering {
            fn clear(&self) {
                let count = self.clears.fetch_add(1, Ordering::SeqCst);
                if count == 0
                    && let Some(me) = self.me.lock().clone()
                {
                    self.provider.register_historical_cache(me);
                }
            }
        }

        let provider = Arc::new(provider());
        let cache = Arc::new(Reregistering {
            provider: provider.clone(),
            me: parking_lot::Mutex::new(None),
            clears: AtomicUsize::new(0),
        });
        let me: Weak<dyn DependentCache> = Arc::downgrade(&cache) as Weak<dyn DependentCache>;
        *cache.me.lock() = Some(me.clone());
        provider.register_historical_cache(me);

        provider.push_highest_allowed_key(Some(Timestamp::from_secs(1)));

        // Cleared by the cascade, then once more by the immediate path.
        assert_eq!(cache.clears.load(Ordering::SeqCst), 2);
        assert_eq!(provider.pending_registrations(), 0);
    }

    #[test]
    fn test_adjust_key_never_exceeds_boundary() {
        let provider = provider();
        provider.push_highest_allowed_key(Some(Timestamp::from_secs(100)));

        for secs in [-10, 0, 99, 100, 101, 1_000_000] {
            let adjusted = provider.adjust_key(Timestamp::from_secs(secs)).unwrap();
            let boundary = provider.highest_allowed_key(true).unwrap().unwrap();
            assert!(adjusted.key() <= boundary);
        }
    }

    #[test]
    fn test_retreating_push_invalidates_tags() {
        let provider = provider();
        provider.push_highest_allowed_key(Some(Timestamp::from_secs(100)));
        let key = provider.adjust_key(Timestamp::from_secs(90)).unwrap();
        assert!(provider.is_adjusted_key(&key));

        provider.push_highest_allowed_key(Some(Timestamp::from_secs(120)));
        assert!(provider.is_adjusted_key(&key));

        provider.push_highest_allowed_key(Some(Timestamp::from_secs(50)));
        assert!(!provider.is_adjusted_key(&key));
        assert_eq!(
            provider.maybe_adjust_key(key).unwrap().key(),
            Timestamp::from_secs(50)
        );
    }

    #[test]
    fn test_clear_before_boundary_keeps_registrations() {
        let provider = provider();
        let a = Counting::new();
        provider.register_historical_cache(weak(&a));

        provider.clear();
        assert_eq!(a.clears(), 1);
        assert_eq!(provider.pending_registrations(), 1);

        provider.push_highest_allowed_key(Some(Timestamp::from_secs(5)));
        assert_eq!(a.clears(), 2);
        assert_eq!(provider.pending_registrations(), 0);
    }

    #[test]
    fn test_recursive_fallback_uses_guard() {
        static GUARD: RecursionGuard = RecursionGuard::new();
        let clock: Arc<dyn TimeSource> = Arc::new(|| Timestamp::from_secs(8));
        let provider = Arc::new(PushingAdjustKeyProvider::new(
            PullingAdjustKeyProvider::from_clock(clock).with_guard(&GUARD),
        ));

        let ticket = GUARD.try_enter().unwrap();
        // Nested on this thread: nothing remembered yet.
        assert_eq!(provider.highest_allowed_key(true).unwrap(), None);

        // Another thread is not nested and still reaches the clock.
        let elsewhere = {
            let provider = provider.clone();
            std::thread::spawn(move || provider.adjust_key(Timestamp::from_secs(50)).unwrap())
        };
        assert_eq!(elsewhere.join().unwrap().key(), Timestamp::from_secs(8));

        // That call remembered the boundary, so the nested answer now has it.
        assert_eq!(
            provider.highest_allowed_key(true).unwrap(),
            Some(Timestamp::from_secs(8))
        );
        drop(ticket);
        assert_eq!(
            provider.highest_allowed_key(true).unwrap(),
            Some(Timestamp::from_secs(8))
        );
    }
}
