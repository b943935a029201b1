//! Core types for Ember.
//!
//! This module defines the dynamic object model shared by the executor and
//! session layers:
//!
//! - [`Value`]: a dynamically typed parameter or result value
//! - [`ValueType`]: the exact runtime type of a value
//! - [`Record`]: a named record type with string-keyed fields
//! - [`ObjectRef`]: a shared, mutable handle to a record

mod record;
mod value;

pub use record::{ObjectRef, Record};
pub use value::{Value, ValueType};
