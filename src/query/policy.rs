//! How queries treat entries that lie after their reference key.

use crate::error::{HorizonError, Result};
use crate::merge::Keyed;
use horizon_types::Timestamp;
use serde::{Deserialize, Serialize};

/// Reaction of a query whose nearest entry is chronologically after the key
/// it was asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutureValuePolicy {
    /// Return the entry anyway.
    WithFuture,
    /// Answer "no entry".
    WithFutureNull,
    /// Fail with [`HorizonError::InvariantViolation`].
    #[default]
    WithoutFuture,
}

impl FutureValuePolicy {
    /// Vet `entry` against `reference`.
    ///
    /// ```rust
    /// use horizon::{FutureValuePolicy, Timestamp};
    ///
    /// let asked = Timestamp::from_secs(10);
    /// let found = Timestamp::from_secs(12);
    /// assert_eq!(FutureValuePolicy::WithFuture.assert_entry(asked, found)?, Some(found));
    /// assert_eq!(FutureValuePolicy::WithFutureNull.assert_entry(asked, found)?, None);
    /// assert!(FutureValuePolicy::WithoutFuture.assert_entry(asked, found).is_err());
    /// # Ok::<(), horizon::HorizonError>(())
    /// ```
    pub fn assert_entry<T: Keyed>(self, reference: Timestamp, entry: T) -> Result<Option<T>> {
        let found = entry.key();
        if found <= reference {
            return Ok(Some(entry));
        }
        match self {
            FutureValuePolicy::WithFuture => Ok(Some(entry)),
            FutureValuePolicy::WithFutureNull => {
                log::trace!("suppressed future entry {} for reference {}", found, reference);
                Ok(None)
            }
            FutureValuePolicy::WithoutFuture => Err(HorizonError::InvariantViolation {
                requested: reference,
                found,
            }),
        }
    }

    /// Like [`assert_entry`](Self::assert_entry), but passes everything when
    /// no reference is known.
    pub fn assert_optional<T: Keyed>(
        self,
        reference: Option<Timestamp>,
        entry: T,
    ) -> Result<Option<T>> {
        match reference {
            Some(reference) => self.assert_entry(reference, entry),
            None => Ok(Some(entry)),
        }
    }

    pub fn allows_future(self) -> bool {
        self == FutureValuePolicy::WithFuture
    }
}
