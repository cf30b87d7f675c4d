//! Storage error types.

use gateway_core::StoreError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Storage error type.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Could not connect or the pool is unavailable.
    #[error("database connection error: {0}")]
    Connection(String),

    /// SQL execution error.
    #[error("SQL execution error: {0}")]
    Execution(String),

    /// A row could not be decoded.
    #[error("row decode error: {0}")]
    Decode(String),

    /// An applied migration no longer matches its definition.
    #[error("checksum mismatch for migration {version}: recorded {recorded}, defined {defined}")]
    ChecksumMismatch {
        /// Migration version
        version: i64,
        /// Checksum stored when applied
        recorded: String,
        /// Checksum of the current definition
        defined: String,
    },

    /// Migration failed.
    #[error("migration {version} failed: {reason}")]
    MigrationFailed {
        /// Migration version
        version: i64,
        /// Failure reason
        reason: String,
    },

    /// Pool acquisition timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Invalid connection settings.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DatabaseError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an execution error.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Check if the error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Config(e.to_string()),
            sqlx::Error::Database(e) => Self::Execution(e.to_string()),
            sqlx::Error::Io(e) => Self::Connection(e.to_string()),
            sqlx::Error::Tls(e) => Self::Connection(e.to_string()),
            sqlx::Error::PoolTimedOut => Self::Timeout("connection pool timed out".to_string()),
            sqlx::Error::PoolClosed => Self::Connection("connection pool is closed".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Decode(err.to_string())
            }
            _ => Self::Execution(err.to_string()),
        }
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Connection(msg) | DatabaseError::Timeout(msg) => Self::Connection(msg),
            DatabaseError::Decode(msg) => Self::Decode(msg),
            other => Self::Query(other.to_string()),
        }
    }
}

/// Map a driver error straight into the core storage error.
pub(crate) fn store_err(err: sqlx::Error) -> StoreError {
    DatabaseError::from(err).into()
}
