//! An in-memory `users` table behind a real session stack.
//!
//! [`MemoryDataSource`] hands out [`RecordingConnection`]s that log every
//! lifecycle call. [`MemoryStrategy`] answers a fixed set of statements
//! against a shared [`MemoryDatabase`], either applying writes at once or
//! buffering them until the batch is flushed.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use ember_common::config::{ExecutorSettings, ExecutorType};
use ember_common::error::{EmberError, EmberResult};
use ember_common::types::Value;
use ember_executor::{
    handle_rows, BatchResult, BoundSql, Configuration, Connection, Cursor, DataSource,
    ExecutionStrategy, Executor, MappedStatement, ParameterMapping, ResultHandler, RowBounds,
    SqlCommandType, StaticSqlSource, StrategyFactory, TransactionIsolationLevel,
};
use ember_session::{DefaultSessionFactory, StatementRegistry};

// =============================================================================
// Connections
// =============================================================================

/// Shared record of connection activity.
#[derive(Debug, Default)]
pub struct ConnectionLog {
    events: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<Option<Duration>>>,
    opened: AtomicUsize,
}

impl ConnectionLog {
    /// Returns the recorded events in order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Returns how often `event` was recorded.
    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Returns the query timeout applied to each execution, in order.
    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.timeouts.lock().clone()
    }

    /// Returns how many connections were opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

/// Connection that records its lifecycle calls.
pub struct RecordingConnection {
    auto_commit: bool,
    closed: bool,
    log: Arc<ConnectionLog>,
}

impl RecordingConnection {
    /// Creates an open connection in auto-commit mode.
    pub fn new(log: Arc<ConnectionLog>) -> Self {
        Self {
            auto_commit: true,
            closed: false,
            log,
        }
    }

    /// Records a statement execution under the given query timeout.
    pub fn execute(&mut self, statement_id: &str, timeout: Option<Duration>) -> EmberResult<()> {
        if self.closed {
            return Err(EmberError::database("connection is closed"));
        }
        self.log.record(format!("execute:{}", statement_id));
        self.log.timeouts.lock().push(timeout);
        Ok(())
    }

    fn ensure_open(&self) -> EmberResult<()> {
        if self.closed {
            Err(EmberError::transaction("connection is closed"))
        } else {
            Ok(())
        }
    }
}

impl Connection for RecordingConnection {
    fn auto_commit(&self) -> EmberResult<bool> {
        self.ensure_open()?;
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> EmberResult<()> {
        self.ensure_open()?;
        self.log.record(format!("auto_commit={}", auto_commit));
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn set_isolation_level(&mut self, level: TransactionIsolationLevel) -> EmberResult<()> {
        self.ensure_open()?;
        self.log.record(format!("isolation={}", level));
        Ok(())
    }

    fn commit(&mut self) -> EmberResult<()> {
        self.ensure_open()?;
        self.log.record("commit");
        Ok(())
    }

    fn rollback(&mut self) -> EmberResult<()> {
        self.ensure_open()?;
        self.log.record("rollback");
        Ok(())
    }

    fn close(&mut self) -> EmberResult<()> {
        self.closed = true;
        self.log.record("close");
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Data source producing [`RecordingConnection`]s.
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    log: Arc<ConnectionLog>,
}

impl MemoryDataSource {
    /// Creates a data source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the log shared by every connection.
    pub fn log(&self) -> Arc<ConnectionLog> {
        Arc::clone(&self.log)
    }
}

impl DataSource for MemoryDataSource {
    fn connection(&self) -> EmberResult<Box<dyn Connection>> {
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        self.log.record("open");
        Ok(Box::new(RecordingConnection::new(Arc::clone(&self.log))))
    }
}

// =============================================================================
// Database
// =============================================================================

/// The `users` table: id to `User` record.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    users: Mutex<BTreeMap<i64, Value>>,
    reads: AtomicUsize,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Inserts a user directly, bypassing any session.
    pub fn seed(&self, id: i64, name: &str) {
        self.users.lock().insert(id, user(id, name));
    }

    /// Returns how many reads reached the database.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Returns the stored name of a user.
    pub fn name_of(&self, id: i64) -> Option<String> {
        self.users
            .lock()
            .get(&id)
            .and_then(Value::as_object)
            .and_then(|u| u.get("name"))
            .and_then(|n| n.as_str().map(str::to_string))
    }

    /// Returns the number of users.
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    /// Returns true if there are no users.
    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }

    fn read(&self, statement: &str, id: Option<i64>, row_bounds: RowBounds) -> EmberResult<Vec<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let users = self.users.lock();
        match statement {
            "selectUser" => {
                let id = id.ok_or_else(|| EmberError::database("selectUser needs an id"))?;
                Ok(users.get(&id).map(Value::deep_clone).into_iter().collect())
            }
            "selectAllUsers" => {
                let offset = usize::try_from(row_bounds.offset()).unwrap_or(0);
                let limit = usize::try_from(row_bounds.limit()).unwrap_or(usize::MAX);
                Ok(users
                    .values()
                    .skip(offset)
                    .take(limit)
                    .map(Value::deep_clone)
                    .collect())
            }
            "failingSelect" => Err(EmberError::database("relation \"missing\" does not exist")),
            other => Err(EmberError::configuration(format!("unknown query '{}'", other))),
        }
    }

    fn write(&self, statement: &str, id: Option<i64>, name: Option<String>) -> EmberResult<u64> {
        let id = id.ok_or_else(|| EmberError::database(format!("{} needs an id", statement)))?;
        let mut users = self.users.lock();
        match statement {
            "insertUser" => {
                let name = name.unwrap_or_default();
                if users.contains_key(&id) {
                    return Err(EmberError::database(format!("duplicate key {}", id)));
                }
                users.insert(id, user(id, &name));
                Ok(1)
            }
            "renameUser" => match users.get(&id).and_then(Value::as_object) {
                Some(existing) => {
                    existing.set("name", Value::from(name.unwrap_or_default()));
                    Ok(1)
                }
                None => Ok(0),
            },
            "deleteUser" => Ok(u64::from(users.remove(&id).is_some())),
            other => Err(EmberError::configuration(format!("unknown write '{}'", other))),
        }
    }
}

/// Builds a `User` record.
pub fn user(id: i64, name: &str) -> Value {
    Value::object("User", [("id", Value::BigInt(id)), ("name", Value::from(name))])
}

// =============================================================================
// Strategy
// =============================================================================

struct PendingWrite {
    statement_id: String,
    sql: String,
    parameter: Value,
    timeout: Option<Duration>,
}

/// Strategy answering the `users` statements.
pub struct MemoryStrategy {
    database: Arc<MemoryDatabase>,
    batching: bool,
    pending: Mutex<Vec<PendingWrite>>,
}

impl MemoryStrategy {
    /// Creates a strategy that applies writes immediately.
    pub fn immediate(database: Arc<MemoryDatabase>) -> Self {
        Self {
            database,
            batching: false,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Creates a strategy that buffers writes until flushed.
    pub fn batching(database: Arc<MemoryDatabase>) -> Self {
        Self {
            database,
            batching: true,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn touch_connection(
        executor: &mut Executor,
        statement_id: &str,
        timeout: Option<Duration>,
    ) -> EmberResult<()> {
        let connection = executor.connection()?;
        match connection.as_any_mut().downcast_mut::<RecordingConnection>() {
            Some(recording) => recording.execute(statement_id, timeout),
            None => Ok(()),
        }
    }

    fn id_of(parameter: Option<&Value>) -> Option<i64> {
        match parameter {
            Some(Value::Object(object)) => object.get("id").and_then(|id| id.to_i64()),
            Some(other) => other.to_i64(),
            None => None,
        }
    }

    fn name_of(executor: &Executor, parameter: Option<&Value>) -> EmberResult<Option<String>> {
        match parameter {
            Some(parameter) if matches!(parameter, Value::Object(_)) => {
                let accessor = executor.configuration().property_accessor();
                Ok(accessor
                    .get_value(parameter, "name")?
                    .as_str()
                    .map(str::to_string))
            }
            _ => Ok(None),
        }
    }

    fn rows(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
    ) -> EmberResult<Vec<Value>> {
        let timeout = executor.statement_timeout(statement)?;
        Self::touch_connection(executor, statement.id(), timeout)?;
        let id = Self::id_of(parameter);
        self.database.read(statement.id(), id, row_bounds)
    }
}

impl ExecutionStrategy for MemoryStrategy {
    fn execute_update(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
    ) -> EmberResult<u64> {
        let timeout = executor.statement_timeout(statement)?;
        if self.batching {
            let bound = statement.bound_sql(parameter)?;
            self.pending.lock().push(PendingWrite {
                statement_id: statement.id().to_string(),
                sql: bound.sql().to_string(),
                parameter: parameter.cloned().unwrap_or(Value::Null),
                timeout,
            });
            return Ok(0);
        }

        Self::touch_connection(executor, statement.id(), timeout)?;
        let id = Self::id_of(parameter);
        let name = Self::name_of(executor, parameter)?;
        self.database.write(statement.id(), id, name)
    }

    fn execute_query(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
        _bound_sql: &BoundSql,
    ) -> EmberResult<Vec<Value>> {
        let rows = self.rows(executor, statement, parameter, row_bounds)?;
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
        row_bounds: RowBounds,
        _bound_sql: &BoundSql,
    ) -> EmberResult<Cursor> {
        let rows = self.rows(executor, statement, parameter, row_bounds)?;
        Ok(Cursor::from_rows(rows))
    }

    fn flush_batch(
        &self,
        executor: &mut Executor,
        is_rollback: bool,
    ) -> EmberResult<Vec<BatchResult>> {
        let pending = std::mem::take(&mut *self.pending.lock());
        if is_rollback || pending.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = pending.len(), "flushing batched writes");
        let mut results: Vec<BatchResult> = Vec::new();
        for write in pending {
            Self::touch_connection(executor, &write.statement_id, write.timeout)?;
            let id = Self::id_of(Some(&write.parameter));
            let name = Self::name_of(executor, Some(&write.parameter))?;
            let count = self.database.write(&write.statement_id, id, name)?;

            let same_statement = results
                .last()
                .map_or(false, |r| r.statement_id() == write.statement_id && r.sql() == write.sql);
            if !same_statement {
                results.push(BatchResult::new(write.statement_id.clone(), write.sql.clone()));
            }
            if let Some(result) = results.last_mut() {
                let mut counts = result.update_counts().to_vec();
                counts.push(i64::try_from(count).unwrap_or(i64::MAX));
                result.set_update_counts(counts);
                result.add_parameter_object(write.parameter);
            }
        }
        Ok(results)
    }
}

/// Creates [`MemoryStrategy`]s over one database.
pub struct MemoryStrategyFactory {
    database: Arc<MemoryDatabase>,
}

impl MemoryStrategyFactory {
    /// Creates a factory.
    pub fn new(database: Arc<MemoryDatabase>) -> Self {
        Self { database }
    }
}

impl StrategyFactory for MemoryStrategyFactory {
    fn create(&self, executor_type: ExecutorType) -> EmberResult<Arc<dyn ExecutionStrategy>> {
        let database = Arc::clone(&self.database);
        let strategy: Arc<dyn ExecutionStrategy> = match executor_type {
            ExecutorType::Simple | ExecutorType::Reuse => {
                Arc::new(MemoryStrategy::immediate(database))
            }
            ExecutorType::Batch => Arc::new(MemoryStrategy::batching(database)),
        };
        Ok(strategy)
    }
}

/// The statements [`MemoryStrategy`] understands.
pub fn user_statements() -> EmberResult<StatementRegistry> {
    let statement = |id: &str, sql: &str, command: SqlCommandType, mappings: Vec<ParameterMapping>| {
        MappedStatement::builder(id, Arc::new(StaticSqlSource::new(sql, mappings)))
            .resource("UserMapper.xml")
            .command_type(command)
            .build()
    };

    StatementRegistry::new()
        .with(statement(
            "selectUser",
            "SELECT * FROM users WHERE id = ?",
            SqlCommandType::Select,
            vec![ParameterMapping::input("id")],
        ))?
        .with(statement(
            "selectAllUsers",
            "SELECT * FROM users ORDER BY id",
            SqlCommandType::Select,
            vec![],
        ))?
        .with(statement(
            "failingSelect",
            "SELECT * FROM missing",
            SqlCommandType::Select,
            vec![],
        ))?
        .with(statement(
            "insertUser",
            "INSERT INTO users (id, name) VALUES (?, ?)",
            SqlCommandType::Insert,
            vec![ParameterMapping::input("id"), ParameterMapping::input("name")],
        ))?
        .with(statement(
            "renameUser",
            "UPDATE users SET name = ? WHERE id = ?",
            SqlCommandType::Update,
            vec![ParameterMapping::input("name"), ParameterMapping::input("id")],
        ))?
        .with(statement(
            "deleteUser",
            "DELETE FROM users WHERE id = ?",
            SqlCommandType::Delete,
            vec![ParameterMapping::input("id")],
        ))
}

/// A session factory over a fresh in-memory database.
pub struct MemoryFixture {
    /// The database.
    pub database: Arc<MemoryDatabase>,
    /// Connection activity.
    pub connections: Arc<ConnectionLog>,
    /// The factory.
    pub factory: DefaultSessionFactory,
}

impl MemoryFixture {
    /// Creates a fixture with the given settings.
    pub fn new(settings: ExecutorSettings) -> EmberResult<Self> {
        let database = MemoryDatabase::new();
        let data_source = MemoryDataSource::new();
        let connections = data_source.log();
        let factory = DefaultSessionFactory::new(
            Configuration::new(settings),
            user_statements()?,
            Arc::new(data_source),
            Arc::new(MemoryStrategyFactory::new(Arc::clone(&database))),
        );
        Ok(Self {
            database,
            connections,
            factory,
        })
    }
}
