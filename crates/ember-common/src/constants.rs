//! System-wide constants for Ember.

// =============================================================================
// Cache Key Hashing
// =============================================================================

/// Multiplier applied to the rolling cache-key hash on every update.
pub const CACHE_KEY_MULTIPLIER: i32 = 37;

/// Initial value of the rolling cache-key hash.
pub const CACHE_KEY_SEED: i32 = 17;

/// Hash contribution of a null value.
pub const NULL_HASH: i32 = 1;

// =============================================================================
// Row Bounds
// =============================================================================

/// Offset used when no pagination is requested.
pub const NO_ROW_OFFSET: i32 = 0;

/// Limit used when no pagination is requested.
pub const NO_ROW_LIMIT: i32 = i32::MAX;

// =============================================================================
// Cache Identifiers
// =============================================================================

/// Identifier of the per-session result cache.
pub const LOCAL_CACHE_ID: &str = "LocalCache";

/// Identifier of the per-session output-parameter cache.
pub const LOCAL_OUTPUT_PARAMETER_CACHE_ID: &str = "LocalOutputParameterCache";
