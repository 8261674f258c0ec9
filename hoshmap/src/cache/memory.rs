use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::{CacheError, CacheStats, CacheTier};
use crate::content::Content;

/// In-process cache tier.
#[derive(Debug)]
pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<String, Content>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create a new empty cache with a name for log messages.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Stores an entry without touching the statistics.
    pub fn insert(&self, id: &str, content: Content) {
        self.entries.write().insert(id.to_string(), content);
    }

    /// Reads an entry without touching the statistics.
    pub fn peek(&self, id: &str) -> Option<Content> {
        self.entries.read().get(id).cloned()
    }

    /// Removes an entry.
    pub fn remove(&self, id: &str) -> Option<Content> {
        self.entries.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheTier for MemoryCache {
    fn contains(&self, id: &str) -> Result<bool, CacheError> {
        let found = self.entries.read().contains_key(id);
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    fn get(&self, id: &str) -> Result<Option<Content>, CacheError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.read().get(id).cloned())
    }

    fn set(&self, id: &str, content: &Content) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(id.to_string(), content.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
