use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A point in time with nanosecond resolution, measured from the Unix epoch.
///
/// Timestamps are `Copy`, immutable and totally ordered; equality and ordering
/// both use the nanosecond value only. The raw value `i64::MIN` is reserved so
/// that an `Option<Timestamp>` can be packed into a single atomic word, which
/// makes [`Timestamp::MIN`] one nanosecond later than `i64::MIN`.
///
/// # Examples
///
/// ```
/// use horizon_types::timestamp::{TimeUnit, Timestamp};
///
/// let t = Timestamp::from_millis(1_500);
/// assert_eq!(t.as_nanos(), 1_500_000_000);
/// assert_eq!(t.add_unit(TimeUnit::Seconds, -1), Timestamp::from_millis(500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Timestamp(i64);

impl Timestamp {
    /// Earliest representable timestamp.
    pub const MIN: Timestamp = Timestamp(i64::MIN + 1);
    /// Latest representable timestamp.
    pub const MAX: Timestamp = Timestamp(i64::MAX);
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Create a timestamp from nanoseconds since the epoch.
    ///
    /// The reserved value `i64::MIN` is clamped to [`Timestamp::MIN`].
    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        if nanos == i64::MIN {
            Self::MIN
        } else {
            Self(nanos)
        }
    }

    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        Self::from_nanos(micros.saturating_mul(TimeUnit::Micros.nanos()))
    }

    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self::from_nanos(millis.saturating_mul(TimeUnit::Millis.nanos()))
    }

    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        Self::from_nanos(secs.saturating_mul(TimeUnit::Seconds.nanos()))
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert from a [`SystemTime`], saturating at the representable range.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self::from_nanos(i64::try_from(after.as_nanos()).unwrap_or(i64::MAX)),
            Err(err) => {
                let before = i64::try_from(err.duration().as_nanos()).unwrap_or(i64::MAX);
                Self::from_nanos(-before)
            }
        }
    }

    /// Convert into a [`SystemTime`].
    pub fn to_system_time(self) -> SystemTime {
        if self.0 >= 0 {
            UNIX_EPOCH + Duration::from_nanos(self.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_nanos(self.0.unsigned_abs())
        }
    }

    /// Nanoseconds since the epoch.
    #[inline]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    #[inline]
    pub fn is_before_or_equal(&self, other: &Timestamp) -> bool {
        self.0 <= other.0
    }

    #[inline]
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    #[inline]
    pub fn is_after_or_equal(&self, other: &Timestamp) -> bool {
        self.0 >= other.0
    }

    /// Move this timestamp by `amount` units (negative moves backwards).
    ///
    /// Saturates at [`Timestamp::MIN`] / [`Timestamp::MAX`].
    pub fn add_unit(self, unit: TimeUnit, amount: i64) -> Self {
        let delta = amount.saturating_mul(unit.nanos());
        Self::from_nanos(self.0.saturating_add(delta))
    }

    /// Elapsed time from `earlier` to `self`, or `None` if `earlier` is later.
    pub fn duration_since(&self, earlier: &Timestamp) -> Option<Duration> {
        let diff = i128::from(self.0) - i128::from(earlier.0);
        u64::try_from(diff).ok().map(Duration::from_nanos)
    }
}

impl From<i64> for Timestamp {
    fn from(nanos: i64) -> Self {
        Self::from_nanos(nanos)
    }
}

impl From<Timestamp> for i64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.div_euclid(TimeUnit::Seconds.nanos());
        let nanos = self.0.rem_euclid(TimeUnit::Seconds.nanos());
        write!(f, "{}.{:09}", secs, nanos)
    }
}

/// Fixed-length time units used to step timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Nanos,
    Micros,
    Millis,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    /// Length of one unit in nanoseconds.
    pub const fn nanos(self) -> i64 {
        match self {
            TimeUnit::Nanos => 1,
            TimeUnit::Micros => 1_000,
            TimeUnit::Millis => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 3_600 * 1_000_000_000,
            TimeUnit::Days => 86_400 * 1_000_000_000,
            TimeUnit::Weeks => 7 * 86_400 * 1_000_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_value_is_clamped() {
        assert_eq!(Timestamp::from_nanos(i64::MIN), Timestamp::MIN);
        assert_eq!(Timestamp::from(i64::MIN).as_nanos(), i64::MIN + 1);
    }

    #[test]
    fn test_ordering_helpers() {
        let a = Timestamp::from_secs(1);
        let b = Timestamp::from_secs(2);
        assert!(a.is_before(&b));
        assert!(b.is_after(&a));
        assert!(a.is_before_or_equal(&a));
        assert!(a.is_after_or_equal(&a));
        assert!(!a.is_after(&a));
    }

    #[test]
    fn test_add_unit_saturates() {
        let t = Timestamp::MAX.add_unit(TimeUnit::Days, 1);
        assert_eq!(t, Timestamp::MAX);

        let t = Timestamp::MIN.add_unit(TimeUnit::Weeks, -10);
        assert_eq!(t, Timestamp::MIN);

        let t = Timestamp::EPOCH.add_unit(TimeUnit::Minutes, 2);
        assert_eq!(t, Timestamp::from_secs(120));
    }

    #[test]
    fn test_system_time_conversion() {
        let t = Timestamp::from_millis(1_700_000_000_123);
        assert_eq!(Timestamp::from_system_time(t.to_system_time()), t);

        let before_epoch = Timestamp::from_secs(-5);
        assert_eq!(
            Timestamp::from_system_time(before_epoch.to_system_time()),
            before_epoch
        );
    }

    #[test]
    fn test_duration_since() {
        let a = Timestamp::from_secs(10);
        let b = Timestamp::from_secs(12);
        assert_eq!(b.duration_since(&a), Some(Duration::from_secs(2)));
        assert_eq!(a.duration_since(&b), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::from_millis(1_500).to_string(), "1.500000000");
        assert_eq!(Timestamp::from_nanos(-1).to_string(), "-1.999999999");
    }

    #[test]
    fn test_integer_conversions() {
        let raw: i64 = Timestamp::from_secs(3).into();
        assert_eq!(raw, 3_000_000_000);
        assert_eq!(Timestamp::from(raw), Timestamp::from_secs(3));
    }
}
