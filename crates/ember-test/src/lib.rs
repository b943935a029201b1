//! # ember-test
//!
//! Test fixtures and integration tests for Ember.
//!
//! This crate contains:
//! - A scripted execution strategy and a recording transaction for
//!   driving an executor directly
//! - An in-memory `users` database with a recording connection for
//!   driving full sessions

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Scripted strategy and recording transaction
pub mod fixtures;

/// In-memory database behind a session factory
pub mod memory;
