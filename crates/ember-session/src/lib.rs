//! # ember-session
//!
//! Sessions over the Ember executor.
//!
//! A [`SessionFactory`] opens [`Session`]s, each with its own transaction,
//! executor, and local cache. Statements are looked up by id in a
//! [`StatementRegistry`]. [`with_session`] runs a closure as one unit of
//! work: commit on success, rollback on failure, close always.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod factory;
pub mod registry;
pub mod scope;
pub mod session;

pub use factory::{DefaultSessionFactory, SessionFactory, SessionOptions};
pub use registry::StatementRegistry;
pub use scope::{with_session, with_session_options};
pub use session::{Session, SessionId};

pub use ember_executor::TransactionIsolationLevel;
