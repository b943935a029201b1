//! Per-session local cache.
//!
//! The local cache is a plain map from [`CacheKey`] to [`CacheEntry`]: no
//! eviction, no TTL, no capacity bound. Its lifetime is managed entirely by
//! the executor, which clears it on writes, commits, rollbacks, and (for
//! statement scope) at the end of each top-level query.

use std::collections::HashMap;

use crate::key::CacheKey;
use crate::stats::CacheStats;

/// A local-cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry<V> {
    /// A fetch for this key is in progress.
    Placeholder,
    /// The result is available.
    Ready(V),
}

impl<V> CacheEntry<V> {
    /// Returns true if this entry marks an in-flight fetch.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, CacheEntry::Placeholder)
    }

    /// Returns true if this entry holds a value.
    pub fn is_ready(&self) -> bool {
        matches!(self, CacheEntry::Ready(_))
    }

    /// Returns the value if ready.
    pub fn as_ready(&self) -> Option<&V> {
        match self {
            CacheEntry::Ready(value) => Some(value),
            CacheEntry::Placeholder => None,
        }
    }

    /// Consumes the entry, returning the value if ready.
    pub fn into_ready(self) -> Option<V> {
        match self {
            CacheEntry::Ready(value) => Some(value),
            CacheEntry::Placeholder => None,
        }
    }
}

/// An unbounded map from cache key to tagged entry.
///
/// Not synchronized: a local cache belongs to exactly one executor, which is
/// driven by one caller at a time.
#[derive(Debug)]
pub struct LocalCache<V> {
    /// Cache identifier, used in logs.
    id: String,
    /// The entries.
    entries: HashMap<CacheKey, CacheEntry<V>>,
    /// Statistics.
    stats: CacheStats,
}

impl<V> LocalCache<V> {
    /// Creates an empty cache with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: HashMap::new(),
            stats: CacheStats::new(),
        }
    }

    /// Returns the cache identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Looks up an entry.
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry<V>> {
        let entry = self.entries.get(key);
        match entry {
            Some(CacheEntry::Ready(_)) => self.stats.record_hit(),
            Some(CacheEntry::Placeholder) => self.stats.record_in_flight_hit(),
            None => self.stats.record_miss(),
        }
        entry
    }

    /// Looks up a ready value, ignoring placeholders.
    pub fn get_ready(&self, key: &CacheKey) -> Option<&V> {
        self.get(key).and_then(CacheEntry::as_ready)
    }

    /// Stores an entry, returning the previous one.
    pub fn put(&mut self, key: CacheKey, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        self.stats.record_insert();
        self.entries.insert(key, entry)
    }

    /// Marks a key as in flight.
    pub fn put_placeholder(&mut self, key: CacheKey) -> Option<CacheEntry<V>> {
        self.put(key, CacheEntry::Placeholder)
    }

    /// Stores a ready value.
    pub fn put_ready(&mut self, key: CacheKey, value: V) -> Option<CacheEntry<V>> {
        self.put(key, CacheEntry::Ready(value))
    }

    /// Removes an entry.
    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.entries.remove(key)
    }

    /// Returns true if any entry (placeholder or ready) exists for the key.
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.stats.record_clear();
        self.entries.clear();
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
