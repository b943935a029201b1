//! Composite cache keys.
//!
//! A `CacheKey` is built by folding an ordered sequence of contributions.
//! Every update feeds the contribution's stable hash into a rolling hash
//! and a checksum, and keeps the contribution itself so that equality can
//! be decided exactly rather than by hash alone.

use std::fmt;
use std::hash::{Hash, Hasher};

use ember_common::constants::{CACHE_KEY_MULTIPLIER, CACHE_KEY_SEED};
use ember_common::types::Value;

/// An order-sensitive composite key.
///
/// Two keys are equal iff their ordered contribution sequences are equal.
/// The rolling hash, checksum, and count are compared first as a cheap
/// rejection test.
///
/// # Example
///
/// ```rust
/// use ember_cache::CacheKey;
///
/// let mut a = CacheKey::new();
/// a.update("select");
/// a.update(1);
///
/// let mut b = CacheKey::new();
/// b.update(1);
/// b.update("select");
///
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct CacheKey {
    /// Multiplier applied to the rolling hash on every update.
    multiplier: i32,
    /// Rolling hash over all contributions.
    hashcode: i32,
    /// Sum of the raw contribution hashes.
    checksum: i64,
    /// Number of contributions.
    count: usize,
    /// The contributions, in update order.
    update_list: Vec<Value>,
}

impl CacheKey {
    /// Creates an empty key.
    pub fn new() -> Self {
        Self {
            multiplier: CACHE_KEY_MULTIPLIER,
            hashcode: CACHE_KEY_SEED,
            checksum: 0,
            count: 0,
            update_list: Vec::new(),
        }
    }

    /// Creates a key from a sequence of contributions.
    pub fn from_parts<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut key = Self::new();
        key.update_all(parts);
        key
    }

    /// Appends a contribution.
    ///
    /// Byte-string and list contributions are hashed element-wise, so the
    /// result depends only on the contribution's contents.
    pub fn update(&mut self, value: impl Into<Value>) {
        let value = value.into();
        let mut base = value.stable_hash();

        self.count += 1;
        self.checksum += i64::from(base);
        base = base.wrapping_mul(self.count as i32);

        self.hashcode = self.multiplier.wrapping_mul(self.hashcode).wrapping_add(base);
        self.update_list.push(value);
    }

    /// Appends every contribution in order.
    pub fn update_all<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for value in values {
            self.update(value);
        }
    }

    /// Returns the number of contributions.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns the rolling hash.
    pub fn hash_code(&self) -> i32 {
        self.hashcode
    }

    /// Returns the contributions in update order.
    pub fn contributions(&self) -> &[Value] {
        &self.update_list
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self.update_list == other.update_list
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hashcode);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for value in &self.update_list {
            write!(f, ":{}", value)?;
        }
        Ok(())
    }
}
