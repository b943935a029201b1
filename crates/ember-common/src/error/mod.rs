//! Error handling for Ember.
//!
//! This module provides a unified error type and result alias used
//! across all Ember components.

mod executor;

pub use executor::{EmberError, ErrorCode};

/// Result type alias for Ember operations.
pub type EmberResult<T> = std::result::Result<T, EmberError>;
