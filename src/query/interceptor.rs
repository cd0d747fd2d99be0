//! Hook that lets an outer cache take over key navigation.

use crate::error::Result;
use horizon_types::Timestamp;

/// Direction of a navigation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Previous,
    Next,
}

/// Answer of a [`KeysQueryInterceptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intercepted {
    /// Not handled; walk the store as usual.
    Pass,
    /// The key `shift_units` steps away, or `None` if there is none.
    Key(Option<Timestamp>),
}

/// Overrides navigation of a cache's key space.
///
/// For [`Direction::Previous`], `shift_units == 0` asks for the key at or
/// before `key`. For [`Direction::Next`], `shift_units` is at least one.
pub trait KeysQueryInterceptor: Send + Sync {
    fn navigate(&self, direction: Direction, key: Timestamp, shift_units: usize)
    -> Result<Intercepted>;
}

impl<F> KeysQueryInterceptor for F
where
    F: Fn(Direction, Timestamp, usize) -> Result<Intercepted> + Send + Sync,
{
    fn navigate(
        &self,
        direction: Direction,
        key: Timestamp,
        shift_units: usize,
    ) -> Result<Intercepted> {
        self(direction, key, shift_units)
    }
}
