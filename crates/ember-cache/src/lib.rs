//! Local (first-level) caching for the Ember executor.
//!
//! This crate provides the two data structures the executor core caches
//! results with:
//!
//! - **CacheKey**: an order-sensitive composite key folded from statement
//!   identity, pagination bounds, SQL text, parameter values, and
//!   environment
//! - **LocalCache**: an unbounded per-session map from `CacheKey` to a
//!   tagged entry, either an in-flight placeholder or a ready value
//!
//! # Example
//!
//! ```rust
//! use ember_cache::{CacheEntry, CacheKey, LocalCache};
//!
//! let mut key = CacheKey::new();
//! key.update("getUser");
//! key.update(0);
//! key.update(10);
//!
//! let mut cache = LocalCache::new("LocalCache");
//! cache.put_placeholder(key.clone());
//! assert!(matches!(cache.get(&key), Some(CacheEntry::Placeholder)));
//!
//! cache.put_ready(key.clone(), vec![1, 2, 3]);
//! assert_eq!(cache.get_ready(&key), Some(&vec![1, 2, 3]));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod key;
pub mod local;
pub mod stats;

pub use key::CacheKey;
pub use local::{CacheEntry, LocalCache};
pub use stats::CacheStats;
