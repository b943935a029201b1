//! The execution hooks an [`Executor`] delegates database work to.
//!
//! The executor owns caching, transactions, and lifecycle; a strategy only
//! talks to the database. Hooks receive the executor itself so that row
//! mapping can issue nested queries and defer association loads through it.
//!
//! Strategies are shared behind an `Arc` and called through `&self`. Any
//! per-executor state (statement caches, pending batches) lives behind a
//! lock inside the strategy, and that lock must not be held while calling
//! back into the executor.

use std::sync::Arc;

use ember_common::config::ExecutorType;
use ember_common::error::EmberResult;
use ember_common::types::Value;

use crate::cursor::Cursor;
use crate::executor::Executor;
use crate::mapping::{BoundSql, MappedStatement, RowBounds};
use crate::result::ResultHandler;

/// Result of flushing one buffered batch statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    statement_id: String,
    sql: String,
    parameter_objects: Vec<Value>,
    update_counts: Vec<i64>,
}

impl BatchResult {
    /// Creates an empty batch result for a statement.
    pub fn new(statement_id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            statement_id: statement_id.into(),
            sql: sql.into(),
            parameter_objects: Vec::new(),
            update_counts: Vec::new(),
        }
    }

    /// Records a parameter object that was added to the batch.
    pub fn add_parameter_object(&mut self, parameter: Value) {
        self.parameter_objects.push(parameter);
    }

    /// Sets the per-parameter update counts reported by the driver.
    pub fn set_update_counts(&mut self, counts: Vec<i64>) {
        self.update_counts = counts;
    }

    /// Returns the statement id.
    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    /// Returns the SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the batched parameter objects.
    pub fn parameter_objects(&self) -> &[Value] {
        &self.parameter_objects
    }

    /// Returns the update counts.
    pub fn update_counts(&self) -> &[i64] {
        &self.update_counts
    }
}

/// Database-facing hooks of an executor.
pub trait ExecutionStrategy: Send + Sync {
    /// Executes a write and returns the affected row count.
    fn execute_update(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
    ) -> EmberResult<u64>;

    /// Executes a read and returns the mapped rows.
    ///
    /// When a result handler is given, rows go to the handler and the
    /// returned list may be empty.
    fn execute_query(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
        bound_sql: &BoundSql,
    ) -> EmberResult<Vec<Value>>;

    /// Executes a read and returns a lazy cursor over its rows.
    fn execute_cursor_query(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> EmberResult<Cursor>;

    /// Sends buffered statements, or discards them on rollback.
    fn flush_batch(&self, executor: &mut Executor, is_rollback: bool)
        -> EmberResult<Vec<BatchResult>>;
}

/// Builds strategies for new executors.
pub trait StrategyFactory: Send + Sync {
    /// Creates a strategy of the given type.
    fn create(&self, executor_type: ExecutorType) -> EmberResult<Arc<dyn ExecutionStrategy>>;
}
