//! The executor: local cache, deferred loads, and transaction lifecycle
//! around a pluggable [`ExecutionStrategy`].
//!
//! ## Query algorithm
//!
//! 1. A closed executor rejects the call.
//! 2. At depth 0, a statement that requires it clears the local cache.
//! 3. The query depth is incremented for the duration of the lookup.
//! 4. Without a result handler, the local cache is consulted:
//!    - a ready entry is returned as is,
//!    - a placeholder (the same query is in flight further up the stack)
//!      yields an empty list,
//!    - a miss runs the strategy with a placeholder installed, then stores
//!      the rows.
//!
//!    Callable statements copy cached OUT parameters back into the caller's
//!    parameter object on every hit.
//! 5. When the depth returns to 0, deferred loads are resolved in FIFO
//!    order and, under statement scope, the local cache is cleared.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, debug_span, warn};

use ember_cache::{CacheEntry, CacheKey, CacheStats, LocalCache};
use ember_common::config::LocalCacheScope;
use ember_common::constants::{LOCAL_CACHE_ID, LOCAL_OUTPUT_PARAMETER_CACHE_ID};
use ember_common::error::{EmberError, EmberResult};
use ember_common::types::{ObjectRef, Value};

use crate::config::Configuration;
use crate::cursor::Cursor;
use crate::deferred::{DeferredLoad, ResultExtractor, TargetType};
use crate::mapping::{BoundSql, MappedStatement, ParameterMode, RowBounds, StatementKind};
use crate::result::ResultHandler;
use crate::strategy::{BatchResult, ExecutionStrategy};
use crate::transaction::{apply_transaction_timeout, Connection, Transaction};

/// A query result shared between the local cache and callers.
pub type ResultList = Arc<Vec<Value>>;

/// Routes the requests row mapping makes back into the executor stack.
///
/// A decorating executor (for example a second-level cache) installs
/// itself as the delegate so that nested queries, deferred loads, and
/// cache lookups issued during row mapping pass through it.
pub trait ExecutorDelegate: Send + Sync {
    /// Runs a nested query issued during row mapping.
    fn query(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> EmberResult<ResultList> {
        executor.query_with_key(statement, parameter, row_bounds, None, key, bound_sql)
    }

    /// Records or performs a deferred association load.
    fn defer_load(
        &self,
        executor: &mut Executor,
        statement: &MappedStatement,
        result_object: &ObjectRef,
        property: &str,
        key: CacheKey,
        target_type: TargetType,
    ) -> EmberResult<()> {
        executor.defer_load(statement, result_object, property, key, target_type)
    }

    /// Returns true if the key is present in the local cache.
    fn is_cached(&self, executor: &Executor, statement: &MappedStatement, key: &CacheKey) -> bool {
        executor.is_cached(statement, key)
    }
}

/// Delegate that calls the executor directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDelegate;

impl ExecutorDelegate for DirectDelegate {}

/// Statement executor bound to one transaction.
///
/// An executor is used by one caller at a time; nested calls made by the
/// strategy during row mapping re-enter it through the `&mut Executor` the
/// strategy is handed.
pub struct Executor {
    configuration: Arc<Configuration>,
    strategy: Arc<dyn ExecutionStrategy>,
    delegate: Arc<dyn ExecutorDelegate>,
    transaction: Option<Box<dyn Transaction>>,
    local_cache: LocalCache<ResultList>,
    output_parameter_cache: LocalCache<Value>,
    deferred_loads: VecDeque<DeferredLoad>,
    extractor: ResultExtractor,
    query_depth: usize,
    closed: bool,
}

impl Executor {
    /// Creates an open executor.
    pub fn new(
        configuration: Arc<Configuration>,
        transaction: Box<dyn Transaction>,
        strategy: Arc<dyn ExecutionStrategy>,
    ) -> Self {
        let extractor = ResultExtractor::new(configuration.object_factory());
        Self {
            configuration,
            strategy,
            delegate: Arc::new(DirectDelegate),
            transaction: Some(transaction),
            local_cache: LocalCache::new(LOCAL_CACHE_ID),
            output_parameter_cache: LocalCache::new(LOCAL_OUTPUT_PARAMETER_CACHE_ID),
            deferred_loads: VecDeque::new(),
            extractor,
            query_depth: 0,
            closed: false,
        }
    }

    /// Returns the configuration.
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Returns the transaction.
    pub fn transaction(&self) -> EmberResult<&(dyn Transaction + 'static)> {
        self.transaction
            .as_deref()
            .ok_or(EmberError::closed("get transaction"))
    }

    /// Returns the transaction for mutation.
    pub fn transaction_mut(&mut self) -> EmberResult<&mut (dyn Transaction + 'static)> {
        self.transaction
            .as_deref_mut()
            .ok_or(EmberError::closed("get transaction"))
    }

    /// Returns the transaction's connection, opening it if needed.
    pub fn connection(&mut self) -> EmberResult<&mut (dyn Connection + 'static)> {
        self.transaction_mut()?.connection()
    }

    /// Returns the timeout a statement should run with: its own (or the
    /// configured default), capped by the transaction timeout.
    pub fn statement_timeout(&self, statement: &MappedStatement) -> EmberResult<Option<Duration>> {
        let statement_timeout = statement
            .timeout()
            .or_else(|| self.configuration.settings().default_statement_timeout());
        let transaction_timeout = self.transaction()?.timeout()?;
        Ok(apply_transaction_timeout(statement_timeout, transaction_timeout))
    }

    /// Returns true once the executor has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the current query nesting depth.
    pub fn query_depth(&self) -> usize {
        self.query_depth
    }

    /// Returns the number of deferred loads waiting to be resolved.
    pub fn pending_deferred_loads(&self) -> usize {
        self.deferred_loads.len()
    }

    /// Returns local-cache statistics.
    pub fn local_cache_stats(&self) -> &CacheStats {
        self.local_cache.stats()
    }

    /// Returns the number of local-cache entries.
    pub fn local_cache_len(&self) -> usize {
        self.local_cache.len()
    }

    fn ensure_open(&self, operation: &'static str) -> EmberResult<()> {
        if self.closed {
            Err(EmberError::closed(operation))
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Delegation
    // =========================================================================

    /// Installs the delegate nested requests are routed through.
    pub fn set_delegate(&mut self, delegate: Arc<dyn ExecutorDelegate>) {
        self.delegate = delegate;
    }

    /// Returns the installed delegate.
    pub fn delegate(&self) -> Arc<dyn ExecutorDelegate> {
        Arc::clone(&self.delegate)
    }

    /// Runs a nested query through the delegate.
    pub fn nested_query(
        &mut self,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> EmberResult<ResultList> {
        let delegate = self.delegate();
        delegate.query(self, statement, parameter, row_bounds, key, bound_sql)
    }

    /// Requests a deferred load through the delegate.
    pub fn request_defer_load(
        &mut self,
        statement: &MappedStatement,
        result_object: &ObjectRef,
        property: &str,
        key: CacheKey,
        target_type: TargetType,
    ) -> EmberResult<()> {
        let delegate = self.delegate();
        delegate.defer_load(self, statement, result_object, property, key, target_type)
    }

    /// Probes the cache through the delegate.
    pub fn request_is_cached(&self, statement: &MappedStatement, key: &CacheKey) -> bool {
        self.delegate.is_cached(self, statement, key)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Executes a write.
    ///
    /// The local cache is cleared before the strategy runs.
    pub fn update(
        &mut self,
        statement: &MappedStatement,
        parameter: Option<&Value>,
    ) -> EmberResult<u64> {
        let _span = debug_span!(
            "update",
            statement = %statement.id(),
            resource = %statement.resource()
        )
        .entered();

        self.ensure_open("update")?;
        self.clear_local_cache();

        let strategy = Arc::clone(&self.strategy);
        strategy
            .execute_update(self, statement, parameter)
            .map_err(|e| e.in_statement(statement.id()))
    }

    /// Sends or discards buffered statements.
    pub fn flush_statements(&mut self, is_rollback: bool) -> EmberResult<Vec<BatchResult>> {
        self.ensure_open("flush statements")?;
        let strategy = Arc::clone(&self.strategy);
        strategy.flush_batch(self, is_rollback)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Executes a read, computing the cache key from the statement.
    pub fn query(
        &mut self,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> EmberResult<ResultList> {
        self.ensure_open("query")?;
        let bound_sql = statement.bound_sql(parameter)?;
        let key = self.create_cache_key(statement, parameter, row_bounds, &bound_sql)?;
        self.query_with_key(statement, parameter, row_bounds, result_handler, key, &bound_sql)
    }

    /// Executes a read with a precomputed cache key and bound SQL.
    pub fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> EmberResult<ResultList> {
        let _span = debug_span!(
            "query",
            statement = %statement.id(),
            resource = %statement.resource(),
            depth = self.query_depth
        )
        .entered();

        self.ensure_open("query")?;
        if self.query_depth == 0 && statement.flush_cache_required() {
            self.clear_local_cache();
        }

        self.query_depth += 1;
        let outcome =
            self.query_at_depth(statement, parameter, row_bounds, result_handler, &key, bound_sql);
        self.query_depth -= 1;
        let list = outcome?;

        if self.query_depth == 0 {
            self.resolve_deferred_loads()?;
            if self.configuration.local_cache_scope() == LocalCacheScope::Statement {
                self.clear_local_cache();
            }
        }
        Ok(list)
    }

    fn query_at_depth(
        &mut self,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> EmberResult<ResultList> {
        if let Some(handler) = result_handler {
            debug!("streaming query bypasses the local cache");
            let strategy = Arc::clone(&self.strategy);
            let rows = strategy
                .execute_query(self, statement, parameter, row_bounds, Some(handler), bound_sql)
                .map_err(|e| e.in_statement(statement.id()))?;
            return Ok(Arc::new(rows));
        }

        let cached = match self.local_cache.get(key) {
            Some(CacheEntry::Ready(list)) => {
                debug!("local cache hit");
                Some(Arc::clone(list))
            }
            Some(CacheEntry::Placeholder) => {
                debug!("query already in flight, deferring to the outer call");
                Some(Arc::new(Vec::new()))
            }
            None => None,
        };

        match cached {
            Some(list) => {
                self.restore_output_parameters(statement, key, parameter, bound_sql)?;
                Ok(list)
            }
            None => self.query_from_database(statement, parameter, row_bounds, key, bound_sql),
        }
    }

    fn query_from_database(
        &mut self,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> EmberResult<ResultList> {
        debug!("local cache miss");
        self.local_cache.put_placeholder(key.clone());

        let strategy = Arc::clone(&self.strategy);
        let outcome = strategy.execute_query(self, statement, parameter, row_bounds, None, bound_sql);
        self.local_cache.remove(key);

        let list: ResultList = Arc::new(outcome.map_err(|e| e.in_statement(statement.id()))?);
        self.local_cache.put_ready(key.clone(), Arc::clone(&list));
        if statement.kind() == StatementKind::Callable {
            if let Some(parameter) = parameter {
                self.output_parameter_cache
                    .put_ready(key.clone(), parameter.deep_clone());
            }
        }
        Ok(list)
    }

    /// Copies OUT and INOUT values from the cached parameter snapshot back
    /// into the caller's parameter object.
    fn restore_output_parameters(
        &self,
        statement: &MappedStatement,
        key: &CacheKey,
        parameter: Option<&Value>,
        bound_sql: &BoundSql,
    ) -> EmberResult<()> {
        if statement.kind() != StatementKind::Callable {
            return Ok(());
        }
        let (Some(cached), Some(parameter)) = (self.output_parameter_cache.get_ready(key), parameter)
        else {
            return Ok(());
        };

        let accessor = self.configuration.property_accessor();
        for mapping in bound_sql.parameter_mappings() {
            if mapping.mode() != ParameterMode::In {
                let value = accessor.get_value(cached, mapping.property())?;
                accessor.set_value(parameter, mapping.property(), value)?;
            }
        }
        Ok(())
    }

    /// Executes a read and returns a lazy cursor. Cursor reads bypass the
    /// local cache.
    pub fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
    ) -> EmberResult<Cursor> {
        let _span = debug_span!(
            "query_cursor",
            statement = %statement.id(),
            resource = %statement.resource()
        )
        .entered();

        self.ensure_open("query cursor")?;
        let bound_sql = statement.bound_sql(parameter)?;
        let strategy = Arc::clone(&self.strategy);
        strategy
            .execute_cursor_query(self, statement, parameter, row_bounds, &bound_sql)
            .map_err(|e| e.in_statement(statement.id()))
    }

    // =========================================================================
    // Cache keys
    // =========================================================================

    /// Builds the cache key for a read.
    ///
    /// Contributions, in order: statement id, offset, limit, SQL text, the
    /// value of every IN/INOUT parameter, and the environment id if set.
    pub fn create_cache_key(
        &self,
        statement: &MappedStatement,
        parameter: Option<&Value>,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> EmberResult<CacheKey> {
        self.ensure_open("create cache key")?;

        let mut key = CacheKey::new();
        key.update(statement.id());
        key.update(row_bounds.offset());
        key.update(row_bounds.limit());
        key.update(bound_sql.sql());

        for mapping in bound_sql.parameter_mappings() {
            if mapping.mode() != ParameterMode::Out {
                key.update(self.parameter_value(mapping.property(), parameter, bound_sql)?);
            }
        }

        if let Some(environment) = self.configuration.environment_id() {
            key.update(environment);
        }
        Ok(key)
    }

    fn parameter_value(
        &self,
        property: &str,
        parameter: Option<&Value>,
        bound_sql: &BoundSql,
    ) -> EmberResult<Value> {
        let accessor = self.configuration.property_accessor();

        if let Some((root, rest)) = bound_sql.additional_parameter_root(property) {
            return match rest {
                Some(path) => accessor.get_value(root, path),
                None => Ok(root.clone()),
            };
        }

        match parameter.filter(|p| !p.is_null()) {
            None => Ok(Value::Null),
            Some(parameter)
                if self
                    .configuration
                    .type_resolver()
                    .has_type_handler(&parameter.value_type()) =>
            {
                Ok(parameter.clone())
            }
            Some(parameter) => accessor.get_value(parameter, property),
        }
    }

    /// Returns true if the key has an entry (ready or in flight) in the
    /// local cache.
    pub fn is_cached(&self, _statement: &MappedStatement, key: &CacheKey) -> bool {
        self.local_cache.contains_key(key)
    }

    /// Clears both local caches. Does nothing once closed.
    pub fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear();
            self.output_parameter_cache.clear();
        }
    }

    // =========================================================================
    // Deferred loads
    // =========================================================================

    /// Assigns a cached association to a property, now if its result is
    /// ready and otherwise once the outermost query completes.
    pub fn defer_load(
        &mut self,
        _statement: &MappedStatement,
        result_object: &ObjectRef,
        property: &str,
        key: CacheKey,
        target_type: TargetType,
    ) -> EmberResult<()> {
        self.ensure_open("defer load")?;

        let load = DeferredLoad::new(result_object.clone(), property, key, target_type);
        if load.can_load(&self.local_cache) {
            load.load(
                &self.local_cache,
                &self.extractor,
                self.configuration.property_accessor(),
            )
        } else {
            debug!(property, "queueing deferred load");
            self.deferred_loads.push_back(load);
            Ok(())
        }
    }

    /// Resolves queued loads in FIFO order. The queue is emptied even if a
    /// load fails.
    fn resolve_deferred_loads(&mut self) -> EmberResult<()> {
        if self.deferred_loads.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.deferred_loads);
        debug!(count = pending.len(), "resolving deferred loads");
        for load in pending {
            load.load(
                &self.local_cache,
                &self.extractor,
                self.configuration.property_accessor(),
            )?;
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Clears the local cache, flushes buffered statements, and commits the
    /// transaction if `required`.
    pub fn commit(&mut self, required: bool) -> EmberResult<()> {
        self.ensure_open("commit")?;
        self.clear_local_cache();
        self.flush_statements(false)?;
        if required {
            self.transaction_mut()?.commit()?;
        }
        Ok(())
    }

    /// Clears the local cache, discards buffered statements, and rolls back
    /// the transaction if `required`. Does nothing once closed.
    ///
    /// The transaction is rolled back even when discarding the buffered
    /// statements fails; a rollback failure takes precedence.
    pub fn rollback(&mut self, required: bool) -> EmberResult<()> {
        if self.closed {
            return Ok(());
        }
        self.clear_local_cache();
        let flushed = self.flush_statements(true);
        if required {
            self.transaction_mut()?.rollback()?;
        }
        flushed.map(|_| ())
    }

    /// Closes the executor.
    ///
    /// Rolls back (forwarding to the transaction if `force_rollback`),
    /// closes the transaction, and discards all cached state. Failures are
    /// logged, never returned. Closing twice does nothing.
    pub fn close(&mut self, force_rollback: bool) {
        if self.closed {
            return;
        }
        if let Err(e) = self.rollback(force_rollback) {
            warn!(error = %e, "unexpected failure rolling back on close");
        }
        if let Some(mut transaction) = self.transaction.take() {
            if let Err(e) = transaction.close() {
                warn!(error = %e, "unexpected failure closing transaction");
            }
        }
        self.local_cache.clear();
        self.output_parameter_cache.clear();
        self.deferred_loads.clear();
        self.closed = true;
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("closed", &self.closed)
            .field("query_depth", &self.query_depth)
            .field("local_cache", &self.local_cache.len())
            .field("deferred_loads", &self.deferred_loads.len())
            .finish_non_exhaustive()
    }
}
