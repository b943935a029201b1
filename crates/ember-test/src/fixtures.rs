//! Scripted strategy and recording transaction for executor tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use ember_common::config::ExecutorSettings;
use ember_common::error::{EmberError, EmberResult};
use ember_common::types::Value;
use ember_executor::{
    handle_rows, BatchResult, BoundSql, Configuration, Connection, Cursor, ExecutionStrategy,
    Executor, MappedStatement, ParameterMapping, ResultHandler, RowBounds, SqlCommandType,
    StaticSqlSource, StatementKind, Transaction,
};

/// Row producer run by [`ScriptedStrategy`] for every database query.
pub type QueryScript = dyn Fn(&mut Executor, &MappedStatement, Option<&Value>, &BoundSql) -> EmberResult<Vec<Value>>
    + Send
    + Sync;

/// Strategy whose queries are answered by a closure.
///
/// Every hook invocation is recorded. The script receives the executor and
/// may issue nested queries or deferred loads through it.
pub struct ScriptedStrategy {
    script: Box<QueryScript>,
    queries: Mutex<Vec<String>>,
    updates: Mutex<Vec<String>>,
    flushes: Mutex<Vec<bool>>,
    fail_flush: AtomicBool,
}

impl ScriptedStrategy {
    /// Creates a strategy answering queries with `script`.
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&mut Executor, &MappedStatement, Option<&Value>, &BoundSql) -> EmberResult<Vec<Value>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            queries: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            flushes: Mutex::new(Vec::new()),
            fail_flush: AtomicBool::new(false),
        })
    }

    /// Creates a strategy answering every query with the same rows.
    pub fn returning(rows: Vec<Value>) -> Arc<Self> {
        Self::new(move |_, _, _, _| Ok(rows.clone()))
    }

    /// Makes every subsequent batch flush fail.
    pub fn fail_flushes(&self) {
        self.fail_flush.store(true, Ordering::SeqCst);
    }

    /// Returns the ids of the statements that reached the database.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Returns how many queries reached the database.
    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    /// Returns the ids of the executed writes.
    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().clone()
    }

    /// Returns the `is_rollback` flag of every flush.
    pub fn flushes(&self) -> Vec<bool> {
        self.flushes.lock().clone()
    }

    fn run(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        bound_sql: &BoundSql,
    ) -> EmberResult<Vec<Value>> {
        self.queries.lock().push(statement.id().to_string());
        (self.script)(executor, statement, parameter, bound_sql)
    }
}

impl ExecutionStrategy for ScriptedStrategy {
    fn execute_update(
        &self,
        _executor: &mut Executor,
        statement: &MappedStatement,
        _parameter: Option<&Value>,
    ) -> EmberResult<u64> {
        self.updates.lock().push(statement.id().to_string());
        Ok(1)
    }

    fn execute_query(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        _row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
        bound_sql: &BoundSql,
    ) -> EmberResult<Vec<Value>> {
        let rows = self.run(executor, statement, parameter, bound_sql)?;
        match result_handler {
            Some(handler) => {
                handle_rows(handler, &rows);
                Ok(Vec::new())
            }
            None => Ok(rows),
        }
    }

    fn execute_cursor_query(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        _row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> EmberResult<Cursor> {
        let rows = self.run(executor, statement, parameter, bound_sql)?;
        Ok(Cursor::from_rows(rows))
    }

    fn flush_batch(
        &self,
        _executor: &mut Executor,
        is_rollback: bool,
    ) -> EmberResult<Vec<BatchResult>> {
        self.flushes.lock().push(is_rollback);
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(EmberError::database("batch flush failed"));
        }
        Ok(Vec::new())
    }
}

/// Shared record of what a [`RecordingTransaction`] was asked to do.
#[derive(Debug, Default)]
pub struct TransactionLog {
    events: Mutex<Vec<&'static str>>,
    fail_rollback: AtomicBool,
    fail_close: AtomicBool,
}

impl TransactionLog {
    /// Returns the recorded calls in order.
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().clone()
    }

    /// Returns how often `event` was recorded.
    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| **e == event).count()
    }

    /// Makes rollback fail.
    pub fn fail_rollback(&self) {
        self.fail_rollback.store(true, Ordering::SeqCst);
    }

    /// Makes close fail.
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    fn record(&self, event: &'static str) {
        self.events.lock().push(event);
    }
}

/// Transaction that records calls and has no connection.
pub struct RecordingTransaction {
    log: Arc<TransactionLog>,
    timeout: Option<Duration>,
}

impl RecordingTransaction {
    /// Creates a transaction writing to `log`.
    pub fn new(log: Arc<TransactionLog>) -> Self {
        Self { log, timeout: None }
    }

    /// Sets the transaction timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Transaction for RecordingTransaction {
    fn connection(&mut self) -> EmberResult<&mut (dyn Connection + 'static)> {
        Err(EmberError::transaction("recording transactions have no connection"))
    }

    fn commit(&mut self) -> EmberResult<()> {
        self.log.record("commit");
        Ok(())
    }

    fn rollback(&mut self) -> EmberResult<()> {
        self.log.record("rollback");
        if self.log.fail_rollback.load(Ordering::SeqCst) {
            return Err(EmberError::transaction("rollback failed"));
        }
        Ok(())
    }

    fn close(&mut self) -> EmberResult<()> {
        self.log.record("close");
        if self.log.fail_close.load(Ordering::SeqCst) {
            return Err(EmberError::transaction("close failed"));
        }
        Ok(())
    }

    fn timeout(&self) -> EmberResult<Option<Duration>> {
        Ok(self.timeout)
    }
}

/// Builds an executor over a scripted strategy and a recording transaction.
pub fn scripted_executor(
    settings: ExecutorSettings,
    strategy: &Arc<ScriptedStrategy>,
) -> (Executor, Arc<TransactionLog>) {
    let log = Arc::new(TransactionLog::default());
    let strategy: Arc<dyn ExecutionStrategy> = Arc::clone(strategy) as Arc<dyn ExecutionStrategy>;
    let executor = Executor::new(
        Arc::new(Configuration::new(settings)),
        Box::new(RecordingTransaction::new(Arc::clone(&log))),
        strategy,
    );
    (executor, log)
}

/// Builds a SELECT statement.
pub fn select(id: &str, sql: &str, mappings: Vec<ParameterMapping>) -> MappedStatement {
    MappedStatement::builder(id, Arc::new(StaticSqlSource::new(sql, mappings)))
        .resource("fixtures")
        .command_type(SqlCommandType::Select)
        .build()
}

/// Builds a stored-procedure call.
pub fn callable(id: &str, sql: &str, mappings: Vec<ParameterMapping>) -> MappedStatement {
    MappedStatement::builder(id, Arc::new(StaticSqlSource::new(sql, mappings)))
        .resource("fixtures")
        .command_type(SqlCommandType::Select)
        .kind(StatementKind::Callable)
        .build()
}

/// Builds a write statement.
pub fn write(id: &str, sql: &str, mappings: Vec<ParameterMapping>) -> MappedStatement {
    MappedStatement::builder(id, Arc::new(StaticSqlSource::new(sql, mappings)))
        .resource("fixtures")
        .command_type(SqlCommandType::Update)
        .build()
}
