//! Error types for the database access layer.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Driver failures keep their message and error code; the executor and the
//! transaction coordinator wrap them with the context a caller needs to
//! diagnose the failure (SQL text, parameters, attempts, transaction id).

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::models::QueryParam;

/// Boxed error type accepted from caller-supplied transaction logic.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The step of a transaction block that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    Begin,
    Work,
    Commit,
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Work => write!(f, "work"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Timed out after {}ms waiting for a pooled connection", .timeout.as_millis())]
    AcquisitionTimeout { timeout: Duration },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Query failed after {attempts} attempt(s): {source}")]
    Query {
        sql: String,
        params: Vec<QueryParam>,
        code: Option<String>,
        attempts: u32,
        source: Box<DbError>,
    },

    #[error("Transaction {transaction_id} failed during {stage}: {source}")]
    Transaction {
        transaction_id: String,
        stage: TransactionStage,
        source: BoxError,
    },

    #[error("Fatal pool error: {message}")]
    PoolFatal { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an acquisition timeout error.
    pub fn acquisition_timeout(timeout: Duration) -> Self {
        Self::AcquisitionTimeout { timeout }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Wrap the last attempt's error of an exhausted query.
    pub fn query(
        sql: impl Into<String>,
        params: Vec<QueryParam>,
        attempts: u32,
        source: DbError,
    ) -> Self {
        Self::Query {
            sql: sql.into(),
            params,
            code: source.code().map(str::to_string),
            attempts,
            source: Box::new(source),
        }
    }

    /// Create a transaction error.
    pub fn transaction(
        transaction_id: impl Into<String>,
        stage: TransactionStage,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Transaction {
            transaction_id: transaction_id.into(),
            stage,
            source: source.into(),
        }
    }

    /// Create a fatal pool error.
    pub fn pool_fatal(message: impl Into<String>) -> Self {
        Self::PoolFatal {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::AcquisitionTimeout { .. } => {
                Some("Increase the pool size or the connection timeout, or reduce concurrent load")
            }
            Self::Query { source, .. } => source.suggestion(),
            Self::Transaction { source, .. } => source
                .downcast_ref::<DbError>()
                .and_then(DbError::suggestion),
            _ => None,
        }
    }

    /// Driver-level error code (SQLSTATE on PostgreSQL, extended result code on SQLite).
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            Self::Query { code, .. } => code.as_deref(),
            Self::Transaction { source, .. } => {
                source.downcast_ref::<DbError>().and_then(DbError::code)
            }
            _ => None,
        }
    }

    /// The innermost error in the `source()` chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    /// Check if this error is worth retrying on a fresh connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::AcquisitionTimeout { .. } => true,
            Self::Database {
                sql_state: Some(code),
                ..
            } => is_transient_code(code),
            _ => false,
        }
    }

    /// Check if this error means the pool can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PoolFatal { .. } | Self::Configuration { .. })
    }
}

/// SQLSTATE codes and SQLite result codes that describe a transient condition.
fn is_transient_code(code: &str) -> bool {
    // Class 08: connection exception
    if code.starts_with("08") {
        return true;
    }
    matches!(
        code,
        // serialization_failure, deadlock_detected
        "40001" | "40P01"
        // admin_shutdown, crash_shutdown, cannot_connect_now
        | "57P01" | "57P02" | "57P03"
        // too_many_connections
        | "53300"
        // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_LOCKED_SHAREDCACHE, SQLITE_BUSY_SNAPSHOT
        | "5" | "6" | "261" | "517"
    )
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::acquisition_timeout(Duration::ZERO),
            sqlx::Error::PoolClosed => DbError::PoolClosed,
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::database(
                format!("Type not found: {}", type_name),
                None,
                "Check the types referenced by the statement",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::database(
                format!("Column not found: {}", col),
                None,
                "Check the column names referenced by the statement",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::AnyDriverError(err) => DbError::connection(
                format!("Driver error: {}", err),
                "Check database driver configuration",
            ),
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "The connection was lost; a new one will be opened on retry",
            ),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));

        let err = DbError::acquisition_timeout(Duration::from_millis(2000));
        assert_eq!(
            err.to_string(),
            "Timed out after 2000ms waiting for a pooled connection"
        );
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::PoolClosed.suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::acquisition_timeout(Duration::from_secs(2)).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(DbError::database("deadlock", Some("40P01".into()), "").is_retryable());
        assert!(DbError::database("reset", Some("08006".into()), "").is_retryable());
        assert!(DbError::database("database is locked", Some("5".into()), "").is_retryable());
        assert!(!DbError::database("syntax", Some("42601".into()), "").is_retryable());
        assert!(!DbError::database("no such table", Some("1".into()), "").is_retryable());
        assert!(!DbError::PoolClosed.is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
    }

    #[test]
    fn test_query_error_carries_code_and_context() {
        let source = DbError::database("relation missing", Some("42P01".into()), "check");
        let err = DbError::query("SELECT * FROM nope", vec![QueryParam::Int(1)], 4, source);

        assert_eq!(err.code(), Some("42P01"));
        assert_eq!(err.suggestion(), Some("check"));
        match &err {
            DbError::Query {
                sql,
                params,
                attempts,
                ..
            } => {
                assert_eq!(sql, "SELECT * FROM nope");
                assert_eq!(params, &vec![QueryParam::Int(1)]);
                assert_eq!(*attempts, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("4 attempt(s)"));
    }

    #[test]
    fn test_transaction_error_preserves_cause() {
        let err = DbError::transaction("tx_abc", TransactionStage::Work, "boom");
        assert!(err.to_string().contains("tx_abc"));
        assert!(err.to_string().contains("during work"));
        assert_eq!(err.root_cause().to_string(), "boom");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_transaction_error_exposes_inner_code() {
        let inner = DbError::database("unique violation", Some("23505".into()), "dedupe");
        let err = DbError::transaction("tx_abc", TransactionStage::Commit, inner);
        assert_eq!(err.code(), Some("23505"));
        assert_eq!(err.suggestion(), Some("dedupe"));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(DbError::pool_fatal("idle client error").is_fatal());
        assert!(DbError::configuration("DATABASE_URL missing").is_fatal());
        assert!(!DbError::PoolClosed.is_fatal());
    }

    #[test]
    fn test_sqlx_pool_errors_map_to_pool_variants() {
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::PoolClosed
        ));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolTimedOut),
            DbError::AcquisitionTimeout { .. }
        ));
        assert!(matches!(
            DbError::from(sqlx::Error::RowNotFound),
            DbError::Database { .. }
        ));
    }
}
