//! Sessions.
//!
//! A Session is one unit of interaction with the database: it owns an
//! executor (and through it a transaction and a local cache), resolves
//! statements by id, and tracks whether it has written anything that
//! still needs a commit or rollback.

use std::sync::Arc;

use ember_common::error::{EmberError, EmberResult};
use ember_common::types::Value;
use ember_executor::{
    BatchResult, Configuration, Connection, Cursor, Executor, ResultHandler, ResultList, RowBounds,
};

use crate::registry::StatementRegistry;

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a new session ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

/// A database session.
pub struct Session {
    /// Session ID.
    id: SessionId,
    /// Shared configuration.
    configuration: Arc<Configuration>,
    /// Statements by id.
    statements: Arc<StatementRegistry>,
    /// The executor doing the work.
    executor: Executor,
    /// Whether the transaction commits on its own.
    auto_commit: bool,
    /// Whether a write happened since the last commit or rollback.
    dirty: bool,
    /// Statement counter.
    statement_count: u64,
}

impl Session {
    /// Creates a session over an executor.
    pub fn new(
        id: SessionId,
        configuration: Arc<Configuration>,
        statements: Arc<StatementRegistry>,
        executor: Executor,
        auto_commit: bool,
    ) -> Self {
        Self {
            id,
            configuration,
            statements,
            executor,
            auto_commit,
            dirty: false,
            statement_count: 0,
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the configuration.
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Returns the executor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Returns the executor for direct use.
    pub fn executor_mut(&mut self) -> &mut Executor {
        &mut self.executor
    }

    /// Returns true if a write is waiting for commit or rollback.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true once the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }

    /// Returns the number of statements run through this session.
    pub fn statement_count(&self) -> u64 {
        self.statement_count
    }

    /// Returns the transaction's connection.
    pub fn connection(&mut self) -> EmberResult<&mut (dyn Connection + 'static)> {
        self.executor.connection()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Runs a read expected to return at most one row.
    pub fn select_one(
        &mut self,
        statement_id: &str,
        parameter: Option<&Value>,
    ) -> EmberResult<Option<Value>> {
        let rows = self.select_list(statement_id, parameter)?;
        match rows.as_slice() {
            [] => Ok(None),
            [row] => Ok(Some(row.clone())),
            _ => Err(EmberError::TooManyResults {
                expected: 1,
                actual: rows.len(),
            }),
        }
    }

    /// Runs a read and returns every row.
    pub fn select_list(
        &mut self,
        statement_id: &str,
        parameter: Option<&Value>,
    ) -> EmberResult<ResultList> {
        self.select_list_with_bounds(statement_id, parameter, RowBounds::DEFAULT)
    }

    /// Runs a read with pagination bounds.
    pub fn select_list_with_bounds(
        &mut self,
        statement_id: &str,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
    ) -> EmberResult<ResultList> {
        let statement = self.statements.get(statement_id)?;
        let parameter = wrap_collection(parameter);
        self.statement_count += 1;
        self.executor
            .query(&statement, parameter.as_ref(), row_bounds, None)
    }

    /// Runs a read, streaming rows into a handler.
    pub fn select_with_handler(
        &mut self,
        statement_id: &str,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> EmberResult<()> {
        let statement = self.statements.get(statement_id)?;
        let parameter = wrap_collection(parameter);
        self.statement_count += 1;
        self.executor
            .query(&statement, parameter.as_ref(), row_bounds, Some(handler))
            .map(|_| ())
    }

    /// Runs a read and returns a lazy cursor.
    pub fn select_cursor(
        &mut self,
        statement_id: &str,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
    ) -> EmberResult<Cursor> {
        let statement = self.statements.get(statement_id)?;
        let parameter = wrap_collection(parameter);
        self.statement_count += 1;
        self.executor
            .query_cursor(&statement, parameter.as_ref(), row_bounds)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Runs an INSERT statement.
    pub fn insert(&mut self, statement_id: &str, parameter: Option<&Value>) -> EmberResult<u64> {
        self.update(statement_id, parameter)
    }

    /// Runs an UPDATE statement.
    pub fn update(&mut self, statement_id: &str, parameter: Option<&Value>) -> EmberResult<u64> {
        let statement = self.statements.get(statement_id)?;
        let parameter = wrap_collection(parameter);
        self.dirty = true;
        self.statement_count += 1;
        self.executor.update(&statement, parameter.as_ref())
    }

    /// Runs a DELETE statement.
    pub fn delete(&mut self, statement_id: &str, parameter: Option<&Value>) -> EmberResult<u64> {
        self.update(statement_id, parameter)
    }

    // =========================================================================
    // Transaction Control
    // =========================================================================

    /// Commits. The transaction is only asked to commit when the session
    /// is dirty and not auto-committing, or when `force` is set.
    pub fn commit(&mut self, force: bool) -> EmberResult<()> {
        let required = self.is_commit_or_rollback_required(force);
        self.executor.commit(required)?;
        self.dirty = false;
        Ok(())
    }

    /// Rolls back, with the same rule as [`Session::commit`].
    pub fn rollback(&mut self, force: bool) -> EmberResult<()> {
        let required = self.is_commit_or_rollback_required(force);
        self.executor.rollback(required)?;
        self.dirty = false;
        Ok(())
    }

    /// Sends buffered statements.
    pub fn flush_statements(&mut self) -> EmberResult<Vec<BatchResult>> {
        self.executor.flush_statements(false)
    }

    /// Clears the local cache.
    pub fn clear_cache(&mut self) {
        self.executor.clear_local_cache();
    }

    /// Closes the session, rolling back uncommitted writes.
    pub fn close(&mut self) {
        let rollback = self.is_commit_or_rollback_required(false);
        self.executor.close(rollback);
        self.dirty = false;
    }

    fn is_commit_or_rollback_required(&self, force: bool) -> bool {
        (!self.auto_commit && self.dirty) || force
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("auto_commit", &self.auto_commit)
            .field("dirty", &self.dirty)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Wraps a list parameter in a `ParamMap` record exposing it as both
/// `collection` and `list`.
fn wrap_collection(parameter: Option<&Value>) -> Option<Value> {
    match parameter {
        Some(Value::List(items)) => Some(Value::object(
            "ParamMap",
            [
                ("collection", Value::List(items.clone())),
                ("list", Value::List(items.clone())),
            ],
        )),
        other => other.cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id() {
        let id = SessionId::new(7);
        assert_eq!(id.as_u64(), 7);
        assert_eq!(id.to_string(), "session_7");
    }

    #[test]
    fn test_wrap_collection() {
        let list = Value::List(vec![Value::from(1), Value::from(2)]);
        let wrapped = wrap_collection(Some(&list)).unwrap();
        let record = wrapped.as_object().unwrap();
        assert_eq!(record.type_name(), "ParamMap");
        assert_eq!(record.get("list"), Some(list.clone()));
        assert_eq!(record.get("collection"), Some(list));

        assert_eq!(wrap_collection(Some(&Value::from(5))), Some(Value::from(5)));
        assert_eq!(wrap_collection(None), None);
    }
}
