//! Cache configuration
//!
//! Serializable settings for historical caches, loadable from JSON or TOML.

use crate::adjust::GuardMode;
use crate::error::{HorizonError, Result};
use crate::query::FutureValuePolicy;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Historical cache configuration
///
/// # Example
///
/// ```rust
/// use horizon::{Config, FutureValuePolicy};
///
/// let config = Config::default();
/// assert_eq!(config.future_value_policy, FutureValuePolicy::WithoutFuture);
///
/// let json = r#"{
///     "future_value_policy": "with_future_null",
///     "page_size": 16
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.page_size, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Policy applied when a query resolves to an entry after its reference key
    #[serde(default)]
    pub future_value_policy: FutureValuePolicy,

    /// Number of keys requested from the store per paging call
    #[serde(default = "Config::default_page_size")]
    pub page_size: usize,

    /// Re-entrancy protection used by pull providers built from this config
    #[serde(default)]
    pub guard_mode: GuardMode,

    /// Keep loaded entries in memory until the cache is cleared
    #[serde(default = "Config::default_entry_memo")]
    pub entry_memo: bool,

    /// Most entries kept in memory per cache; the earliest memoized go first
    #[serde(default = "Config::default_memo_capacity")]
    pub memo_capacity: usize,
}

impl Config {
    const fn default_page_size() -> usize {
        64
    }

    const fn default_entry_memo() -> bool {
        true
    }

    const fn default_memo_capacity() -> usize {
        4096
    }

    pub fn with_future_value_policy(mut self, policy: FutureValuePolicy) -> Self {
        self.future_value_policy = policy;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        assert!(page_size > 0, "Page size must be greater than zero");
        self.page_size = page_size;
        self
    }

    pub fn with_guard_mode(mut self, mode: GuardMode) -> Self {
        self.guard_mode = mode;
        self
    }

    pub fn with_entry_memo(mut self, enabled: bool) -> Self {
        self.entry_memo = enabled;
        self
    }

    pub fn with_memo_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Memo capacity must be greater than zero");
        self.memo_capacity = capacity;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.page_size == 0 {
            return Err("Page size must be greater than zero".to_string());
        }
        if self.memo_capacity == 0 {
            return Err("Memo capacity must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load configuration from a file, choosing the format by extension.
    ///
    /// `.toml` files need the `toml` feature; anything else is read as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            #[cfg(feature = "toml")]
            Some("toml") => {
                Self::from_toml(&contents).map_err(|e| HorizonError::Toml(e.to_string()))
            }
            #[cfg(not(feature = "toml"))]
            Some("toml") => Err(HorizonError::Config(format!(
                "Cannot read '{}': built without the toml feature",
                path.display()
            ))),
            _ => Ok(Self::from_json(&contents)?),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            future_value_policy: FutureValuePolicy::default(),
            page_size: Self::default_page_size(),
            guard_mode: GuardMode::default(),
            entry_memo: Self::default_entry_memo(),
            memo_capacity: Self::default_memo_capacity(),
        }
    }
}
