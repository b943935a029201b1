//! Session factories.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use ember_common::config::ExecutorType;
use ember_common::error::EmberResult;
use ember_executor::{
    Configuration, Connection, ConnectionTransactionFactory, DataSource, Executor,
    StrategyFactory, Transaction, TransactionFactory, TransactionIsolationLevel,
};

use crate::registry::StatementRegistry;
use crate::session::{Session, SessionId};

/// Options for opening a session. Unset options fall back to the
/// configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Execution strategy.
    pub executor_type: Option<ExecutorType>,
    /// Transaction isolation level.
    pub isolation_level: Option<TransactionIsolationLevel>,
    /// Auto-commit mode.
    pub auto_commit: Option<bool>,
}

impl SessionOptions {
    /// Creates options that use every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the execution strategy.
    pub fn executor_type(mut self, executor_type: ExecutorType) -> Self {
        self.executor_type = Some(executor_type);
        self
    }

    /// Sets the isolation level.
    pub fn isolation_level(mut self, level: TransactionIsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Sets auto-commit mode.
    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = Some(auto_commit);
        self
    }
}

/// Opens sessions.
pub trait SessionFactory: Send + Sync {
    /// Opens a session with the configured defaults.
    fn open_session(&self) -> EmberResult<Session> {
        self.open_session_with(SessionOptions::default())
    }

    /// Opens a session with explicit options.
    fn open_session_with(&self, options: SessionOptions) -> EmberResult<Session>;

    /// Opens a session over a caller-supplied connection.
    fn open_session_on(
        &self,
        connection: Box<dyn Connection>,
        executor_type: Option<ExecutorType>,
    ) -> EmberResult<Session>;

    /// Returns the configuration sessions are opened with.
    fn configuration(&self) -> &Arc<Configuration>;
}

/// Session factory over a data source.
pub struct DefaultSessionFactory {
    configuration: Arc<Configuration>,
    statements: Arc<StatementRegistry>,
    data_source: Arc<dyn DataSource>,
    transaction_factory: Arc<dyn TransactionFactory>,
    strategy_factory: Arc<dyn StrategyFactory>,
    next_session_id: AtomicU64,
}

impl DefaultSessionFactory {
    /// Creates a factory using [`ConnectionTransactionFactory`].
    pub fn new(
        configuration: Configuration,
        statements: StatementRegistry,
        data_source: Arc<dyn DataSource>,
        strategy_factory: Arc<dyn StrategyFactory>,
    ) -> Self {
        Self {
            configuration: Arc::new(configuration),
            statements: Arc::new(statements),
            data_source,
            transaction_factory: Arc::new(ConnectionTransactionFactory::new()),
            strategy_factory,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Replaces the transaction factory.
    pub fn with_transaction_factory(mut self, factory: Arc<dyn TransactionFactory>) -> Self {
        self.transaction_factory = factory;
        self
    }

    /// Returns the statement registry.
    pub fn statements(&self) -> &Arc<StatementRegistry> {
        &self.statements
    }

    fn build_session(
        &self,
        mut transaction: Box<dyn Transaction>,
        executor_type: Option<ExecutorType>,
        auto_commit: bool,
    ) -> EmberResult<Session> {
        let executor_type =
            executor_type.unwrap_or(self.configuration.settings().default_executor_type);
        let strategy = match self.strategy_factory.create(executor_type) {
            Ok(strategy) => strategy,
            Err(e) => {
                if let Err(close_err) = transaction.close() {
                    warn!(error = %close_err, "failed to close transaction after open failure");
                }
                return Err(e);
            }
        };

        let id = SessionId::new(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        debug!(session = %id, ?executor_type, auto_commit, "opening session");

        let executor = Executor::new(Arc::clone(&self.configuration), transaction, strategy);
        Ok(Session::new(
            id,
            Arc::clone(&self.configuration),
            Arc::clone(&self.statements),
            executor,
            auto_commit,
        ))
    }
}

impl SessionFactory for DefaultSessionFactory {
    fn open_session_with(&self, options: SessionOptions) -> EmberResult<Session> {
        let auto_commit = options
            .auto_commit
            .unwrap_or(self.configuration.settings().auto_commit);
        let transaction = self.transaction_factory.new_transaction(
            Arc::clone(&self.data_source),
            options.isolation_level,
            auto_commit,
        );
        self.build_session(transaction, options.executor_type, auto_commit)
    }

    fn open_session_on(
        &self,
        connection: Box<dyn Connection>,
        executor_type: Option<ExecutorType>,
    ) -> EmberResult<Session> {
        // Drivers that cannot report the mode are treated as auto-commit.
        let auto_commit = connection.auto_commit().unwrap_or(true);
        let transaction = self.transaction_factory.from_connection(connection);
        self.build_session(transaction, executor_type, auto_commit)
    }

    fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }
}

impl std::fmt::Debug for DefaultSessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultSessionFactory")
            .field("configuration", &self.configuration)
            .field("statements", &self.statements.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_options() {
        let options = SessionOptions::new()
            .executor_type(ExecutorType::Batch)
            .isolation_level(TransactionIsolationLevel::Serializable)
            .auto_commit(true);

        assert_eq!(options.executor_type, Some(ExecutorType::Batch));
        assert_eq!(
            options.isolation_level,
            Some(TransactionIsolationLevel::Serializable)
        );
        assert_eq!(options.auto_commit, Some(true));
        assert_eq!(SessionOptions::default().executor_type, None);
    }
}
