//! # Cache Tiers
//!
//! External stores mapping an identity string to content, chained in order.
//!
//! ## Lookup
//!
//! ```text
//! fetch(#a7f2...)
//!   tier 0 (memory):  miss
//!   tier 1 (dir):     miss
//!   tier 2 (sqlite):  hit!
//!        ↓
//!   copy into tier 0 and tier 1
//!        ↓
//!   return content
//! ```
//!
//! A tier that fails to answer is treated as a miss. Writes go to every tier
//! and their failures are reported.

mod dir;
mod memory;
mod sqlite;

pub use dir::DirCache;
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::content::Content;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] io::Error),

    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cache JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache corrupted: {0}")]
    Corrupted(String),

    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// A store addressed by identity.
pub trait CacheTier: Send + Sync {
    /// Whether the store holds `id`.
    fn contains(&self, id: &str) -> Result<bool, CacheError>;

    /// Reads the content stored under `id`.
    fn get(&self, id: &str) -> Result<Option<Content>, CacheError>;

    /// Stores `content` under `id`, replacing any previous entry.
    fn set(&self, id: &str, content: &Content) -> Result<(), CacheError>;

    /// Name used in log messages.
    fn name(&self) -> &str {
        "cache"
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of `contains` calls that found the id.
    pub hits: usize,
    /// Number of `contains` calls that did not.
    pub misses: usize,
    /// Number of `get` calls.
    pub reads: usize,
    /// Number of `set` calls.
    pub writes: usize,
    /// Number of stored entries.
    pub entries: usize,
}

/// A store in a chain.
#[derive(Clone)]
pub struct Tier {
    store: Arc<dyn CacheTier>,
    eager: bool,
}

impl Tier {
    /// A tier that only receives results as they are computed or promoted.
    pub fn new<C: CacheTier + 'static>(store: Arc<C>) -> Self {
        Self { store, eager: false }
    }

    /// A tier that also receives values already evaluated when the chain is
    /// attached to a map.
    pub fn eager<C: CacheTier + 'static>(store: Arc<C>) -> Self {
        Self { store, eager: true }
    }

    /// Wraps a type-erased store.
    pub fn from_dyn(store: Arc<dyn CacheTier>, eager: bool) -> Self {
        Self { store, eager }
    }

    pub fn store(&self) -> &dyn CacheTier {
        self.store.as_ref()
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    fn lookup(&self, id: &str) -> Result<Option<Content>, CacheError> {
        if !self.store.contains(id)? {
            return Ok(None);
        }
        self.store.get(id)
    }
}

impl fmt::Debug for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tier")
            .field("store", &self.store.name())
            .field("eager", &self.eager)
            .finish()
    }
}

/// An ordered sequence of cache tiers.
#[derive(Debug, Clone, Default)]
pub struct CacheChain {
    tiers: Vec<Tier>,
}

impl CacheChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tier.
    pub fn with(mut self, tier: Tier) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Appends a tier.
    pub fn push(&mut self, tier: Tier) {
        self.tiers.push(tier);
    }

    /// Returns this chain followed by `other`.
    pub fn extended(&self, other: &CacheChain) -> CacheChain {
        let mut tiers = self.tiers.clone();
        tiers.extend(other.tiers.iter().cloned());
        CacheChain { tiers }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Tiers that receive already-evaluated values at attach time.
    pub fn eager_tiers(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter().filter(|t| t.eager)
    }

    /// Looks `id` up tier by tier.
    ///
    /// On a hit at tier k, the content is first written into every tier
    /// before k that answered with a miss, so the next lookup stops earlier.
    pub fn fetch(&self, id: &str) -> Result<Option<Content>, CacheError> {
        let mut outdated: Vec<&Tier> = Vec::new();
        for (k, tier) in self.tiers.iter().enumerate() {
            match tier.lookup(id) {
                Ok(Some(content)) => {
                    for stale in &outdated {
                        stale.store.set(id, &content)?;
                    }
                    if !outdated.is_empty() {
                        debug!(id, tier = k, promoted = outdated.len(), "cache hit promoted");
                    } else {
                        debug!(id, tier = tier.store.name(), "cache hit");
                    }
                    return Ok(Some(content));
                }
                Ok(None) => {
                    trace!(id, tier = tier.store.name(), "cache miss");
                    outdated.push(tier);
                }
                Err(e) => {
                    warn!(id, tier = tier.store.name(), error = %e, "cache read failed, treating as miss");
                }
            }
        }
        Ok(None)
    }

    /// Writes `content` under `id` into every tier.
    pub fn store(&self, id: &str, content: &Content) -> Result<(), CacheError> {
        for tier in &self.tiers {
            tier.store.set(id, content)?;
            trace!(id, tier = tier.store.name(), "cache store");
        }
        Ok(())
    }
}

impl From<Vec<Tier>> for CacheChain {
    fn from(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }
}

impl FromIterator<Tier> for CacheChain {
    fn from_iter<I: IntoIterator<Item = Tier>>(iter: I) -> Self {
        Self {
            tiers: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A tier that fails every operation.
    struct Broken;

    impl CacheTier for Broken {
        fn contains(&self, _id: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("broken".into()))
        }

        fn get(&self, _id: &str) -> Result<Option<Content>, CacheError> {
            Err(CacheError::Unavailable("broken".into()))
        }

        fn set(&self, _id: &str, _content: &Content) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("broken".into()))
        }
    }

    #[test]
    fn test_fetch_miss() {
        let chain = CacheChain::new().with(Tier::new(Arc::new(MemoryCache::new())));
        assert_eq!(chain.fetch("nope").unwrap(), None);
    }

    #[test]
    fn test_fetch_promotes_into_earlier_tiers() {
        let a = Arc::new(MemoryCache::new());
        let b = Arc::new(MemoryCache::new());
        let c = Arc::new(MemoryCache::new());
        b.insert("k", json!(1));
        let chain: CacheChain = vec![Tier::new(a.clone()), Tier::new(b.clone()), Tier::new(c.clone())]
            .into_iter()
            .collect();

        assert_eq!(chain.fetch("k").unwrap(), Some(json!(1)));
        assert_eq!(a.peek("k"), Some(json!(1)));
        assert_eq!(c.peek("k"), None);

        // Now served by the first tier directly.
        let before = b.stats();
        assert_eq!(chain.fetch("k").unwrap(), Some(json!(1)));
        assert_eq!(b.stats(), before);
    }

    #[test]
    fn test_broken_tier_is_a_miss() {
        let b = Arc::new(MemoryCache::new());
        b.insert("k", json!("v"));
        let chain = CacheChain::new()
            .with(Tier::new(Arc::new(Broken)))
            .with(Tier::new(b));
        assert_eq!(chain.fetch("k").unwrap(), Some(json!("v")));
    }

    #[test]
    fn test_store_writes_all_tiers() {
        let a = Arc::new(MemoryCache::new());
        let b = Arc::new(MemoryCache::new());
        let chain = CacheChain::new().with(Tier::new(a.clone())).with(Tier::eager(b.clone()));
        chain.store("k", &json!([1, 2])).unwrap();
        assert_eq!(a.peek("k"), Some(json!([1, 2])));
        assert_eq!(b.peek("k"), Some(json!([1, 2])));
        assert_eq!(chain.eager_tiers().count(), 1);
    }

    #[test]
    fn test_store_failure_propagates() {
        let chain = CacheChain::new().with(Tier::new(Arc::new(Broken)));
        assert!(chain.store("k", &json!(1)).is_err());
    }

    #[test]
    fn test_extended_keeps_order() {
        let a = CacheChain::new().with(Tier::new(Arc::new(MemoryCache::named("a"))));
        let b = CacheChain::new().with(Tier::eager(Arc::new(MemoryCache::named("b"))));
        let ab = a.extended(&b);
        assert_eq!(ab.len(), 2);
        assert_eq!(ab.tiers()[0].store().name(), "a");
        assert!(ab.tiers()[1].is_eager());
    }
}
