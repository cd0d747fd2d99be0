//! Provider identities and keys tagged by the provider that clamped them.

use horizon_types::Timestamp;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique identity of an adjust-key provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId(u64);

impl ProviderId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PROVIDER_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider#{}", self.0)
    }
}

/// Marker recording which provider clamped a key, and under which boundary
/// generation.
///
/// A provider bumps its generation whenever its boundary retreats or it is
/// cleared, which turns every tag it handed out earlier stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdjustmentTag {
    pub provider: ProviderId,
    pub generation: u64,
}

/// A timestamp together with the tag of the provider that last clamped it.
///
/// Equality, ordering and hashing only look at the key; the tag is a fast-path
/// hint and never changes what the key means.
#[derive(Debug, Clone, Copy)]
pub struct AdjustedKey {
    key: Timestamp,
    tag: Option<AdjustmentTag>,
}

impl AdjustedKey {
    /// A key that no provider has processed yet.
    pub fn untagged(key: Timestamp) -> Self {
        Self { key, tag: None }
    }

    pub(crate) fn tagged(key: Timestamp, tag: AdjustmentTag) -> Self {
        Self {
            key,
            tag: Some(tag),
        }
    }

    pub fn key(&self) -> Timestamp {
        self.key
    }

    pub fn tag(&self) -> Option<AdjustmentTag> {
        self.tag
    }

    pub fn is_tagged_by(&self, tag: AdjustmentTag) -> bool {
        self.tag == Some(tag)
    }
}

impl From<Timestamp> for AdjustedKey {
    fn from(key: Timestamp) -> Self {
        Self::untagged(key)
    }
}

impl From<AdjustedKey> for Timestamp {
    fn from(key: AdjustedKey) -> Self {
        key.key
    }
}

impl PartialEq for AdjustedKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for AdjustedKey {}

impl PartialOrd for AdjustedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AdjustedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Hash for AdjustedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for AdjustedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{}@{}/{}", self.key, tag.provider, tag.generation),
            None => write!(f, "{}", self.key),
        }
    }
}
