//! Process-unique identity tokens for pooled resources.
//!
//! A token starts life as the object's address folded down to 32 bits and
//! rendered in base 16. That value is only a hint: addresses get reused and
//! the fold discards the upper half on 64-bit targets, so two live objects
//! can share it. Every short token is therefore run through an
//! [`EncounterCounter`], and repeats are disambiguated with a `#<n>` suffix.

use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

/// Function deriving the (non-unique) short hash from an object address.
pub type IdentityHasher = fn(usize) -> u32;

static GLOBAL_ALLOCATOR: LazyLock<IdentityTokenAllocator> =
    LazyLock::new(IdentityTokenAllocator::new);

// ---------------------------------------------------------------------------
// IdentityToken
// ---------------------------------------------------------------------------

/// Opaque identity of a pooled resource.
///
/// Immutable once allocated and never handed out twice by the same
/// allocator.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct IdentityToken(Arc<str>);

impl IdentityToken {
    /// Wrap an existing token value, e.g. one restored from configuration.
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// The token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this token carries a collision suffix.
    #[must_use]
    pub fn is_disambiguated(&self) -> bool {
        self.0.contains('#')
    }
}

impl AsRef<str> for IdentityToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityToken({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// EncounterCounter
// ---------------------------------------------------------------------------

/// Counts how many times each short token has been seen.
///
/// Counts only ever grow. The increment-and-read in [`encounter`] runs
/// under the owning shard's lock, so it is atomic per key.
///
/// [`encounter`]: EncounterCounter::encounter
#[derive(Debug, Default)]
pub struct EncounterCounter {
    counts: DashMap<String, u64>,
}

impl EncounterCounter {
    /// Create an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an encounter of `key`, returning the count *before* this one.
    pub fn encounter(&self, key: &str) -> u64 {
        let mut count = self.counts.entry(key.to_owned()).or_insert(0);
        let prior = *count;
        *count += 1;
        prior
    }

    /// How many times `key` has been encountered so far.
    #[must_use]
    pub fn count(&self, key: &str) -> u64 {
        self.counts.get(key).map_or(0, |c| *c)
    }

    /// Number of distinct keys seen.
    #[must_use]
    pub fn distinct_keys(&self) -> usize {
        self.counts.len()
    }
}

// ---------------------------------------------------------------------------
// IdentityTokenAllocator
// ---------------------------------------------------------------------------

/// Hands out identity tokens that never repeat for the allocator's lifetime.
///
/// Use [`IdentityTokenAllocator::global`] (or [`allocate_identity_token`])
/// for process-lifetime uniqueness; separate instances only guarantee
/// uniqueness among their own tokens.
#[derive(Debug)]
pub struct IdentityTokenAllocator {
    counter: EncounterCounter,
    hasher: IdentityHasher,
}

impl IdentityTokenAllocator {
    /// Create an allocator using the address fold as its short hash.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(fold_address)
    }

    /// Create an allocator with a custom short-hash function.
    #[must_use]
    pub fn with_hasher(hasher: IdentityHasher) -> Self {
        Self {
            counter: EncounterCounter::new(),
            hasher,
        }
    }

    /// The process-wide allocator.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_ALLOCATOR
    }

    /// Allocate a token for `object`; `None` yields `None`.
    pub fn allocate<T: ?Sized>(&self, object: Option<&T>) -> Option<IdentityToken> {
        let object = object?;
        let address = std::ptr::from_ref(object).cast::<()>() as usize;
        Some(self.allocate_for_hash((self.hasher)(address)))
    }

    /// How many times `short_token` has been handed out or disambiguated.
    #[must_use]
    pub fn encounters(&self, short_token: &str) -> u64 {
        self.counter.count(short_token)
    }

    fn allocate_for_hash(&self, hash: u32) -> IdentityToken {
        let short = format!("{hash:x}");
        match self.counter.encounter(&short) {
            0 => IdentityToken::new(short),
            count => {
                tracing::trace!(short_token = %short, count, "identity hash collision, disambiguating");
                IdentityToken::new(format!("{short}#{count}"))
            }
        }
    }
}

impl Default for IdentityTokenAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate a token from the process-wide allocator.
pub fn allocate_identity_token<T: ?Sized>(object: Option<&T>) -> Option<IdentityToken> {
    IdentityTokenAllocator::global().allocate(object)
}

/// Fold an address into 32 bits. Collisions are expected on 64-bit targets.
#[must_use]
pub fn fold_address(address: usize) -> u32 {
    let wide = address as u64;
    (wide ^ (wide >> 32)) as u32
}
