//! # ember-executor
//!
//! The statement-execution core of Ember.
//!
//! An [`Executor`] sits between a session and the database. It owns the
//! transaction, the per-session local cache, and the queue of deferred
//! association loads; everything that actually touches the database is
//! delegated to an [`ExecutionStrategy`].
//!
//! - **Mapping**: statement metadata (`MappedStatement`, `BoundSql`)
//! - **Reflection**: type resolution, property access, object creation
//! - **Transaction**: transactions, connections, and data sources
//! - **Strategy**: the database-facing hooks
//! - **Executor**: caching, nesting, and lifecycle
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ember_common::error::EmberResult;
//! use ember_common::types::Value;
//! use ember_executor::{
//!     BatchResult, BoundSql, Configuration, Cursor, ExecutionStrategy, Executor,
//!     MappedStatement, ResultHandler, RowBounds, SqlCommandType, StaticSqlSource, Transaction,
//! };
//! # use ember_executor::Connection;
//! # use std::time::Duration;
//!
//! struct Constant;
//!
//! impl ExecutionStrategy for Constant {
//!     fn execute_update(&self, _: &mut Executor, _: &MappedStatement, _: Option<&Value>) -> EmberResult<u64> {
//!         Ok(1)
//!     }
//!     fn execute_query(
//!         &self, _: &mut Executor, _: &MappedStatement, _: Option<&Value>,
//!         _: RowBounds, _: Option<&mut dyn ResultHandler>, _: &BoundSql,
//!     ) -> EmberResult<Vec<Value>> {
//!         Ok(vec![Value::from(42)])
//!     }
//!     fn execute_cursor_query(
//!         &self, _: &mut Executor, _: &MappedStatement, _: Option<&Value>,
//!         _: RowBounds, _: &BoundSql,
//!     ) -> EmberResult<Cursor> {
//!         Ok(Cursor::from_rows(vec![]))
//!     }
//!     fn flush_batch(&self, _: &mut Executor, _: bool) -> EmberResult<Vec<BatchResult>> {
//!         Ok(vec![])
//!     }
//! }
//!
//! # struct NoTransaction;
//! # impl Transaction for NoTransaction {
//! #     fn connection(&mut self) -> EmberResult<&mut (dyn Connection + 'static)> {
//! #         Err(ember_common::EmberError::transaction("no connection"))
//! #     }
//! #     fn commit(&mut self) -> EmberResult<()> { Ok(()) }
//! #     fn rollback(&mut self) -> EmberResult<()> { Ok(()) }
//! #     fn close(&mut self) -> EmberResult<()> { Ok(()) }
//! #     fn timeout(&self) -> EmberResult<Option<Duration>> { Ok(None) }
//! # }
//! let mut executor = Executor::new(
//!     Arc::new(Configuration::default()),
//!     Box::new(NoTransaction),
//!     Arc::new(Constant),
//! );
//!
//! let statement = MappedStatement::builder(
//!     "answer",
//!     Arc::new(StaticSqlSource::new("SELECT 42", vec![])),
//! )
//! .command_type(SqlCommandType::Select)
//! .build();
//!
//! let first = executor.query(&statement, None, RowBounds::DEFAULT, None).unwrap();
//! let second = executor.query(&statement, None, RowBounds::DEFAULT, None).unwrap();
//! assert!(Arc::ptr_eq(&first, &second));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cursor;
pub mod deferred;
pub mod executor;
pub mod mapping;
pub mod reflection;
pub mod result;
pub mod strategy;
pub mod transaction;

pub use config::Configuration;
pub use cursor::{Cursor, CursorIter, CursorState, RowSource};
pub use deferred::{DeferredLoad, ResultExtractor, TargetType};
pub use executor::{DirectDelegate, Executor, ExecutorDelegate, ResultList};
pub use mapping::{
    BoundSql, MappedStatement, MappedStatementBuilder, ParameterMapping, ParameterMode,
    RowBounds, SqlCommandType, SqlSource, StatementKind, StaticSqlSource,
};
pub use reflection::{
    DefaultObjectFactory, ObjectFactory, PropertyAccessor, RecordAccessor, RecordConstructor,
    TypeHandlerRegistry, TypeResolver,
};
pub use result::{handle_rows, CollectingResultHandler, ResultContext, ResultHandler};
pub use strategy::{BatchResult, ExecutionStrategy, StrategyFactory};
pub use transaction::{
    apply_transaction_timeout, Connection, ConnectionTransaction, ConnectionTransactionFactory,
    DataSource, Transaction, TransactionFactory, TransactionIsolationLevel,
};
