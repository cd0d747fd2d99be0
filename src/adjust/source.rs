//! Upstream sources a pull provider derives its boundary from.

use super::AdjustKeyProvider;
use crate::error::Result;
use horizon_types::Timestamp;
use std::sync::Arc;

/// Supplies the current time to the root of a provider hierarchy.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

impl<F> TimeSource for F
where
    F: Fn() -> Timestamp + Send + Sync,
{
    fn now(&self) -> Timestamp {
        self()
    }
}

/// Something a pull provider can ask for the highest allowed key.
///
/// `update` is forwarded from the caller of
/// [`AdjustKeyProvider::highest_allowed_key`] so parent providers can decide
/// whether to remember the value.
pub trait BoundarySource: Send + Sync {
    fn current_boundary(&self, update: bool) -> Result<Option<Timestamp>>;
}

impl<F> BoundarySource for F
where
    F: Fn() -> Result<Option<Timestamp>> + Send + Sync,
{
    fn current_boundary(&self, _update: bool) -> Result<Option<Timestamp>> {
        self()
    }
}

/// Boundary equal to the current time of a [`TimeSource`].
pub struct ClockSource {
    clock: Arc<dyn TimeSource>,
}

impl ClockSource {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self { clock }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl BoundarySource for ClockSource {
    fn current_boundary(&self, _update: bool) -> Result<Option<Timestamp>> {
        Ok(Some(self.clock.now()))
    }
}

/// Boundary inherited from a provider higher up in the hierarchy.
pub struct ParentSource {
    parent: Arc<dyn AdjustKeyProvider>,
}

impl ParentSource {
    pub fn new(parent: Arc<dyn AdjustKeyProvider>) -> Self {
        Self { parent }
    }

    pub fn parent(&self) -> &Arc<dyn AdjustKeyProvider> {
        &self.parent
    }
}

impl BoundarySource for ParentSource {
    fn current_boundary(&self, update: bool) -> Result<Option<Timestamp>> {
        self.parent.highest_allowed_key(update)
    }
}

/// The earliest boundary reported by any of several sources.
///
/// Sources without a boundary are ignored; errors propagate unchanged.
pub struct EarliestOf {
    sources: Vec<Arc<dyn BoundarySource>>,
}

impl EarliestOf {
    pub fn new(sources: Vec<Arc<dyn BoundarySource>>) -> Self {
        Self { sources }
    }
}

impl BoundarySource for EarliestOf {
    fn current_boundary(&self, update: bool) -> Result<Option<Timestamp>> {
        let mut earliest: Option<Timestamp> = None;
        for source in &self.sources {
            if let Some(boundary) = source.current_boundary(update)? {
                earliest = Some(earliest.map_or(boundary, |e| e.min(boundary)));
            }
        }
        Ok(earliest)
    }
}
