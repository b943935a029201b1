//! # ember-common
//!
//! Common types, errors, and configuration shared by all Ember crates.
//!
//! This crate provides the foundational pieces every other crate builds on:
//!
//! - **Types**: the dynamic object model (`Value`, `Record`, `ObjectRef`)
//!   used for statement parameters and mapped result objects
//! - **Errors**: unified error handling with `EmberError`
//! - **Config**: executor settings loadable from TOML
//! - **Constants**: cache-key hashing constants and row-bound defaults
//!
//! ## Example
//!
//! ```rust
//! use ember_common::types::Value;
//! use ember_common::error::EmberResult;
//!
//! fn example() -> EmberResult<()> {
//!     let user = Value::object("User", [("id", Value::from(5)), ("name", Value::from("ada"))]);
//!     assert_eq!(user.as_object().unwrap().get("id"), Some(Value::Int(5)));
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{ExecutorSettings, ExecutorType, LocalCacheScope};
pub use constants::*;
pub use error::{EmberError, EmberResult, ErrorCode};
pub use types::{ObjectRef, Record, Value, ValueType};
