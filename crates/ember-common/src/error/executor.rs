//! Executor error types.
//!
//! Provides the error taxonomy shared by the cache, executor, and session
//! layers.

use std::fmt;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,

    // Executor errors (0x0100 - 0x01FF)
    /// Operation attempted on a closed executor.
    ExecutorClosed = 0x0100,
    /// More rows were returned than the target can hold.
    TooManyResults = 0x0101,
    /// Cursor misuse (reopened or iterated twice).
    Cursor = 0x0102,

    // Database errors (0x0200 - 0x02FF)
    /// The execution strategy failed while talking to the database.
    DatabaseOperation = 0x0200,
    /// Transaction or connection lifecycle failure.
    Transaction = 0x0201,

    // Reflection errors (0x0300 - 0x03FF)
    /// Property get/set failed.
    PropertyAccess = 0x0300,
    /// Object construction failed.
    Instantiation = 0x0301,

    // Configuration errors (0x0400 - 0x04FF)
    /// Malformed statement or mapping metadata.
    InvalidMapping = 0x0400,

    // Session errors (0x0500 - 0x05FF)
    /// Session-layer misuse.
    Session = 0x0500,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Executor",
            0x02 => "Database",
            0x03 => "Reflection",
            0x04 => "Configuration",
            0x05 => "Session",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for Ember.
///
/// # Example
///
/// ```rust
/// use ember_common::error::{EmberError, EmberResult, ErrorCode};
///
/// fn update_closed() -> EmberResult<u64> {
///     Err(EmberError::closed("update"))
/// }
///
/// let err = update_closed().unwrap_err();
/// assert_eq!(err.code(), ErrorCode::ExecutorClosed);
/// ```
#[derive(Debug, Error)]
pub enum EmberError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Executor Errors
    // ==========================================================================
    /// Operation attempted after the executor was closed.
    #[error("executor was closed, cannot {operation}")]
    ExecutorClosed {
        /// The rejected operation.
        operation: &'static str,
    },

    /// A single value was expected but the result held more rows.
    #[error("statement returned {actual} rows, where no more than {expected} was expected")]
    TooManyResults {
        /// Maximum number of rows accepted.
        expected: usize,
        /// Number of rows actually returned.
        actual: usize,
    },

    /// Cursor misuse.
    #[error("cursor error: {message}")]
    Cursor {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Database Errors
    // ==========================================================================
    /// Failure reported by the execution strategy.
    #[error("database error{}: {message}", statement_suffix(.statement.as_deref()))]
    Database {
        /// Error message.
        message: String,
        /// Identifier of the statement being executed, if known.
        statement: Option<String>,
        /// The underlying driver error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transaction or connection lifecycle failure.
    #[error("transaction error: {message}")]
    Transaction {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Reflection Errors
    // ==========================================================================
    /// Reading or writing a named property failed.
    #[error("cannot access property '{property}': {message}")]
    Reflection {
        /// The property path.
        property: String,
        /// Error message.
        message: String,
    },

    /// Constructing an object of the requested type failed.
    #[error("cannot instantiate {type_name}: {message}")]
    Instantiation {
        /// The requested type.
        type_name: String,
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Malformed statement or mapping metadata.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Session Errors
    // ==========================================================================
    /// Session-layer misuse.
    #[error("session error: {message}")]
    Session {
        /// Error message.
        message: String,
    },
}

fn statement_suffix(statement: Option<&str>) -> String {
    statement.map(|s| format!(" in '{s}'")).unwrap_or_default()
}

impl EmberError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::ExecutorClosed { .. } => ErrorCode::ExecutorClosed,
            Self::TooManyResults { .. } => ErrorCode::TooManyResults,
            Self::Cursor { .. } => ErrorCode::Cursor,
            Self::Database { .. } => ErrorCode::DatabaseOperation,
            Self::Transaction { .. } => ErrorCode::Transaction,
            Self::Reflection { .. } => ErrorCode::PropertyAccess,
            Self::Instantiation { .. } => ErrorCode::Instantiation,
            Self::Configuration { .. } => ErrorCode::InvalidMapping,
            Self::Session { .. } => ErrorCode::Session,
        }
    }

    /// Returns true if this error reports use of a closed executor.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::ExecutorClosed { .. })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a closed-executor error for the given operation.
    #[must_use]
    pub const fn closed(operation: &'static str) -> Self {
        Self::ExecutorClosed { operation }
    }

    /// Creates a database error without an underlying cause.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            statement: None,
            source: None,
        }
    }

    /// Creates a database error wrapping a driver error.
    #[must_use]
    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            message: message.into(),
            statement: None,
            source: Some(Box::new(source)),
        }
    }

    /// Attaches the executing statement id to a database error.
    ///
    /// Other variants, and database errors that already name a statement,
    /// are returned unchanged.
    #[must_use]
    pub fn in_statement(self, statement_id: &str) -> Self {
        match self {
            Self::Database {
                message,
                statement: None,
                source,
            } => Self::Database {
                message,
                statement: Some(statement_id.to_string()),
                source,
            },
            other => other,
        }
    }

    /// Creates a transaction error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a property-access error.
    #[must_use]
    pub fn reflection(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reflection {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates an instantiation error.
    #[must_use]
    pub fn instantiation(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Instantiation {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a session error.
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_code() {
        let err = EmberError::reflection("address.city", "no such property");
        assert_eq!(err.code(), ErrorCode::PropertyAccess);
        assert_eq!(err.code().category(), "Reflection");
        assert_eq!(EmberError::closed("query").code().category(), "Executor");
        assert_eq!(EmberError::database("boom").code().category(), "Database");
    }

    #[test]
    fn test_error_display() {
        let err = EmberError::closed("commit");
        assert_eq!(err.to_string(), "executor was closed, cannot commit");

        let err = EmberError::TooManyResults {
            expected: 1,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "statement returned 3 rows, where no more than 1 was expected"
        );
    }

    #[test]
    fn test_database_statement_context() {
        let err = EmberError::database("connection reset").in_statement("getUser");
        assert_eq!(err.to_string(), "database error in 'getUser': connection reset");

        // The first statement to claim the error wins.
        let err = err.in_statement("outer");
        assert_eq!(err.to_string(), "database error in 'getUser': connection reset");

        let err = EmberError::closed("query").in_statement("getUser");
        assert!(err.is_closed());
    }

    #[test]
    fn test_database_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "socket closed");
        let err = EmberError::database_with_source("write failed", io_err);
        assert_eq!(err.code(), ErrorCode::DatabaseOperation);
        assert_eq!(err.source().map(|e| e.to_string()).as_deref(), Some("socket closed"));
        assert!(EmberError::database("no cause").source().is_none());
    }
}
