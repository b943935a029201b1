//! Transactions and the connections behind them.
//!
//! The executor only needs a [`Transaction`]: commit, rollback, close,
//! a timeout, and lazy access to a [`Connection`]. [`ConnectionTransaction`]
//! is the standard implementation, managing auto-commit and isolation on a
//! connection borrowed from a [`DataSource`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use ember_common::error::{EmberError, EmberResult};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionIsolationLevel {
    /// Transactions are not supported.
    None,
    /// Read committed.
    ReadCommitted,
    /// Read uncommitted (lowest isolation).
    ReadUncommitted,
    /// Repeatable read.
    RepeatableRead,
    /// Serializable (highest isolation).
    Serializable,
}

impl TransactionIsolationLevel {
    /// Returns the SQL representation.
    pub fn as_sql(&self) -> &'static str {
        match self {
            TransactionIsolationLevel::None => "NONE",
            TransactionIsolationLevel::ReadCommitted => "READ COMMITTED",
            TransactionIsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            TransactionIsolationLevel::RepeatableRead => "REPEATABLE READ",
            TransactionIsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for TransactionIsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A database connection as seen by the transaction layer.
///
/// Statement execution is the strategy's business; strategies reach the
/// concrete driver connection through [`Connection::as_any_mut`].
pub trait Connection: Send {
    /// Returns the connection's auto-commit mode.
    fn auto_commit(&self) -> EmberResult<bool>;

    /// Sets the connection's auto-commit mode.
    fn set_auto_commit(&mut self, auto_commit: bool) -> EmberResult<()>;

    /// Sets the isolation level for subsequent transactions.
    fn set_isolation_level(&mut self, level: TransactionIsolationLevel) -> EmberResult<()>;

    /// Commits the current transaction.
    fn commit(&mut self) -> EmberResult<()>;

    /// Rolls back the current transaction.
    fn rollback(&mut self) -> EmberResult<()>;

    /// Closes the connection.
    fn close(&mut self) -> EmberResult<()>;

    /// Returns the connection for downcasting to the driver type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Source of new connections.
pub trait DataSource: Send + Sync {
    /// Opens a connection.
    fn connection(&self) -> EmberResult<Box<dyn Connection>>;
}

/// The transaction an executor runs in.
pub trait Transaction: Send {
    /// Returns the connection, opening it on first use.
    fn connection(&mut self) -> EmberResult<&mut (dyn Connection + 'static)>;

    /// Commits.
    fn commit(&mut self) -> EmberResult<()>;

    /// Rolls back.
    fn rollback(&mut self) -> EmberResult<()>;

    /// Closes the transaction and releases its connection.
    fn close(&mut self) -> EmberResult<()>;

    /// Returns the transaction timeout, if any.
    fn timeout(&self) -> EmberResult<Option<Duration>>;
}

/// Computes the timeout a statement should run with.
///
/// A transaction timeout applies when the statement has none, or when it is
/// shorter than the statement's own.
pub fn apply_transaction_timeout(
    statement_timeout: Option<Duration>,
    transaction_timeout: Option<Duration>,
) -> Option<Duration> {
    match (statement_timeout, transaction_timeout) {
        (statement, None) => statement,
        (None, Some(tx)) => Some(tx),
        (Some(statement), Some(tx)) if statement.is_zero() || tx < statement => Some(tx),
        (statement, Some(_)) => statement,
    }
}

/// A transaction managed directly on a connection.
///
/// The connection is opened lazily from the data source, configured with
/// the requested isolation level and auto-commit mode, and restored to
/// auto-commit when the transaction closes. Commit and rollback are no-ops
/// while the connection is in auto-commit mode.
pub struct ConnectionTransaction {
    data_source: Option<Arc<dyn DataSource>>,
    connection: Option<Box<dyn Connection>>,
    level: Option<TransactionIsolationLevel>,
    auto_commit: bool,
    skip_auto_commit_reset: bool,
    timeout: Option<Duration>,
}

impl ConnectionTransaction {
    /// Creates a transaction that opens its connection from a data source.
    pub fn new(
        data_source: Arc<dyn DataSource>,
        level: Option<TransactionIsolationLevel>,
        auto_commit: bool,
    ) -> Self {
        Self {
            data_source: Some(data_source),
            connection: None,
            level,
            auto_commit,
            skip_auto_commit_reset: false,
            timeout: None,
        }
    }

    /// Creates a transaction over an already open connection.
    pub fn from_connection(connection: Box<dyn Connection>) -> Self {
        Self {
            data_source: None,
            connection: Some(connection),
            level: None,
            auto_commit: false,
            skip_auto_commit_reset: false,
            timeout: None,
        }
    }

    /// Sets the transaction timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Leaves auto-commit untouched on close.
    pub fn skip_auto_commit_reset(mut self, skip: bool) -> Self {
        self.skip_auto_commit_reset = skip;
        self
    }

    fn open_connection(&mut self) -> EmberResult<()> {
        let data_source = self
            .data_source
            .as_ref()
            .ok_or_else(|| EmberError::transaction("no data source to open a connection from"))?;

        debug!("opening connection");
        let mut connection = data_source.connection()?;
        if let Some(level) = self.level {
            connection.set_isolation_level(level)?;
        }
        Self::set_desired_auto_commit(connection.as_mut(), self.auto_commit)?;
        self.connection = Some(connection);
        Ok(())
    }

    fn set_desired_auto_commit(connection: &mut dyn Connection, desired: bool) -> EmberResult<()> {
        if connection.auto_commit()? != desired {
            debug!(auto_commit = desired, "setting auto-commit");
            connection.set_auto_commit(desired)?;
        }
        Ok(())
    }

    /// Restores auto-commit mode before the connection is released.
    fn reset_auto_commit(&mut self) {
        if self.skip_auto_commit_reset {
            return;
        }
        if let Some(connection) = self.connection.as_mut() {
            let result = match connection.auto_commit() {
                Ok(true) => Ok(()),
                Ok(false) => connection.set_auto_commit(true),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                debug!(error = %e, "failed to reset auto-commit before closing connection");
            }
        }
    }

    fn manual_commit_connection(&mut self) -> EmberResult<Option<&mut Box<dyn Connection>>> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(None);
        };
        if connection.auto_commit()? {
            Ok(None)
        } else {
            Ok(Some(connection))
        }
    }
}

impl Transaction for ConnectionTransaction {
    fn connection(&mut self) -> EmberResult<&mut (dyn Connection + 'static)> {
        if self.connection.is_none() {
            self.open_connection()?;
        }
        self.connection
            .as_deref_mut()
            .ok_or_else(|| EmberError::transaction("connection unavailable"))
    }

    fn commit(&mut self) -> EmberResult<()> {
        if let Some(connection) = self.manual_commit_connection()? {
            debug!("committing connection");
            connection.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> EmberResult<()> {
        if let Some(connection) = self.manual_commit_connection()? {
            debug!("rolling back connection");
            connection.rollback()?;
        }
        Ok(())
    }

    fn close(&mut self) -> EmberResult<()> {
        self.reset_auto_commit();
        if let Some(mut connection) = self.connection.take() {
            debug!("closing connection");
            connection.close()?;
        }
        Ok(())
    }

    fn timeout(&self) -> EmberResult<Option<Duration>> {
        Ok(self.timeout)
    }
}

impl Drop for ConnectionTransaction {
    fn drop(&mut self) {
        if self.connection.is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "failed to close connection on drop");
            }
        }
    }
}

impl fmt::Debug for ConnectionTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTransaction")
            .field("open", &self.connection.is_some())
            .field("level", &self.level)
            .field("auto_commit", &self.auto_commit)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Creates transactions for new sessions.
pub trait TransactionFactory: Send + Sync {
    /// Creates a transaction that opens its connection from a data source.
    fn new_transaction(
        &self,
        data_source: Arc<dyn DataSource>,
        level: Option<TransactionIsolationLevel>,
        auto_commit: bool,
    ) -> Box<dyn Transaction>;

    /// Creates a transaction over an already open connection.
    fn from_connection(&self, connection: Box<dyn Connection>) -> Box<dyn Transaction>;
}

/// Factory for [`ConnectionTransaction`]s.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTransactionFactory {
    timeout: Option<Duration>,
    skip_auto_commit_reset: bool,
}

impl ConnectionTransactionFactory {
    /// Creates a factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout given to every transaction.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Leaves auto-commit untouched when transactions close.
    pub fn skip_auto_commit_reset(mut self, skip: bool) -> Self {
        self.skip_auto_commit_reset = skip;
        self
    }

    fn configure(&self, transaction: ConnectionTransaction) -> ConnectionTransaction {
        let transaction = transaction.skip_auto_commit_reset(self.skip_auto_commit_reset);
        match self.timeout {
            Some(timeout) => transaction.with_timeout(timeout),
            None => transaction,
        }
    }
}

impl TransactionFactory for ConnectionTransactionFactory {
    fn new_transaction(
        &self,
        data_source: Arc<dyn DataSource>,
        level: Option<TransactionIsolationLevel>,
        auto_commit: bool,
    ) -> Box<dyn Transaction> {
        Box::new(self.configure(ConnectionTransaction::new(data_source, level, auto_commit)))
    }

    fn from_connection(&self, connection: Box<dyn Connection>) -> Box<dyn Transaction> {
        Box::new(self.configure(ConnectionTransaction::from_connection(connection)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Log {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    struct FakeConnection {
        auto_commit: bool,
        log: Arc<Log>,
    }

    impl Connection for FakeConnection {
        fn auto_commit(&self) -> EmberResult<bool> {
            Ok(self.auto_commit)
        }

        fn set_auto_commit(&mut self, auto_commit: bool) -> EmberResult<()> {
            self.log.push(format!("auto_commit={}", auto_commit));
            self.auto_commit = auto_commit;
            Ok(())
        }

        fn set_isolation_level(&mut self, level: TransactionIsolationLevel) -> EmberResult<()> {
            self.log.push(format!("isolation={}", level));
            Ok(())
        }

        fn commit(&mut self) -> EmberResult<()> {
            self.log.push("commit");
            Ok(())
        }

        fn rollback(&mut self) -> EmberResult<()> {
            self.log.push("rollback");
            Ok(())
        }

        fn close(&mut self) -> EmberResult<()> {
            self.log.push("close");
            Ok(())
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct FakeDataSource {
        log: Arc<Log>,
    }

    impl DataSource for FakeDataSource {
        fn connection(&self) -> EmberResult<Box<dyn Connection>> {
            self.log.push("open");
            Ok(Box::new(FakeConnection {
                auto_commit: true,
                log: Arc::clone(&self.log),
            }))
        }
    }

    fn data_source(log: &Arc<Log>) -> Arc<dyn DataSource> {
        Arc::new(FakeDataSource {
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_connection_opened_lazily() {
        let log = Arc::new(Log::default());
        let mut tx = ConnectionTransaction::new(
            data_source(&log),
            Some(TransactionIsolationLevel::Serializable),
            false,
        );
        assert!(log.entries().is_empty());

        tx.connection().unwrap();
        tx.connection().unwrap();
        assert_eq!(
            log.entries(),
            vec!["open", "isolation=SERIALIZABLE", "auto_commit=false"]
        );
    }

    #[test]
    fn test_commit_and_rollback_in_manual_mode() {
        let log = Arc::new(Log::default());
        let mut tx = ConnectionTransaction::new(data_source(&log), None, false);

        // Nothing to commit before the connection is opened.
        tx.commit().unwrap();
        assert!(log.entries().is_empty());

        tx.connection().unwrap();
        tx.commit().unwrap();
        tx.rollback().unwrap();
        tx.close().unwrap();

        assert_eq!(
            log.entries(),
            vec!["open", "auto_commit=false", "commit", "rollback", "auto_commit=true", "close"]
        );
    }

    #[test]
    fn test_auto_commit_skips_commit() {
        let log = Arc::new(Log::default());
        let mut tx = ConnectionTransaction::new(data_source(&log), None, true);
        tx.connection().unwrap();
        tx.commit().unwrap();
        tx.rollback().unwrap();
        tx.close().unwrap();
        assert_eq!(log.entries(), vec!["open", "close"]);
    }

    #[test]
    fn test_from_connection_has_no_data_source() {
        let log = Arc::new(Log::default());
        let connection = Box::new(FakeConnection {
            auto_commit: false,
            log: Arc::clone(&log),
        });
        let mut tx = ConnectionTransaction::from_connection(connection).skip_auto_commit_reset(true);
        tx.commit().unwrap();
        tx.close().unwrap();
        assert_eq!(log.entries(), vec!["commit", "close"]);

        // The connection is gone and cannot be reopened.
        assert!(tx.connection().is_err());
    }

    #[test]
    fn test_factory_applies_timeout() {
        let log = Arc::new(Log::default());
        let factory = ConnectionTransactionFactory::new().with_timeout(Duration::from_secs(5));
        let tx = factory.new_transaction(data_source(&log), None, false);
        assert_eq!(tx.timeout().unwrap(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_apply_transaction_timeout() {
        let secs = Duration::from_secs;
        assert_eq!(apply_transaction_timeout(Some(secs(10)), None), Some(secs(10)));
        assert_eq!(apply_transaction_timeout(None, None), None);
        assert_eq!(apply_transaction_timeout(None, Some(secs(3))), Some(secs(3)));
        assert_eq!(apply_transaction_timeout(Some(secs(0)), Some(secs(3))), Some(secs(3)));
        assert_eq!(apply_transaction_timeout(Some(secs(10)), Some(secs(3))), Some(secs(3)));
        assert_eq!(apply_transaction_timeout(Some(secs(2)), Some(secs(3))), Some(secs(2)));
    }
}
