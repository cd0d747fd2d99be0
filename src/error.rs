//! Error types for the horizon cache core.

use horizon_types::Timestamp;
use thiserror::Error;

/// Errors surfaced by providers, merge lists and queries.
///
/// `InvariantViolation` and `Precondition` indicate defects in calling code or
/// in the loader/boundary state; they are not transient and should not be
/// retried.
#[derive(Error, Debug)]
pub enum HorizonError {
    /// A query that forbids future values resolved to an entry after its
    /// reference key.
    #[error("Future value for requested key {requested}: resolved entry key {found} is after it")]
    InvariantViolation {
        requested: Timestamp,
        found: Timestamp,
    },

    /// An argument violated the operation's contract.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The store failed to produce a value or key for `key`.
    #[error("Failed to load key {key}: {reason}")]
    Load { key: Timestamp, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "toml")]
    #[error("TOML error: {0}")]
    Toml(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl HorizonError {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        HorizonError::Precondition(message.into())
    }

    pub(crate) fn load(key: Timestamp, reason: impl Into<String>) -> Self {
        HorizonError::Load {
            key,
            reason: reason.into(),
        }
    }

    /// Whether this error reports a contract defect rather than a failing
    /// collaborator.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            HorizonError::InvariantViolation { .. } | HorizonError::Precondition(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HorizonError>;
