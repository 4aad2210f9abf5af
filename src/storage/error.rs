//! Error types for storage operations

use std::fmt;

use chrono::{DateTime, Utc};

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug)]
pub enum StorageError {
    /// Database connection failed
    ConnectionFailed(String),

    /// Migration failed
    MigrationFailed(String),

    /// Database query failed (the enclosing transaction was rolled back)
    QueryFailed(String),

    /// A session is already open; only one may be open at a time
    SessionAlreadyOpen(i64),

    /// No open session with this id exists
    SessionNotOpen(i64),

    /// Referenced device row does not exist
    UnknownDevice(i64),

    /// Snapshot timestamp would go backwards within its session
    OutOfOrderSnapshot {
        session_id: i64,
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    /// Row serialization/deserialization error
    SerializationError(String),

    /// I/O error (file access, etc.)
    IoError(std::io::Error),
}

impl StorageError {
    /// The store refused the data itself; retrying the same write cannot
    /// succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StorageError::SessionAlreadyOpen(_)
                | StorageError::SessionNotOpen(_)
                | StorageError::UnknownDevice(_)
                | StorageError::OutOfOrderSnapshot { .. }
                | StorageError::SerializationError(_)
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to database: {}", msg)
            }
            StorageError::MigrationFailed(msg) => write!(f, "database migration failed: {}", msg),
            StorageError::QueryFailed(msg) => write!(f, "storage query failed: {}", msg),
            StorageError::SessionAlreadyOpen(id) => {
                write!(f, "monitoring session #{} is still open", id)
            }
            StorageError::SessionNotOpen(id) => {
                write!(f, "no open monitoring session with id #{}", id)
            }
            StorageError::UnknownDevice(id) => write!(f, "no device with id #{}", id),
            StorageError::OutOfOrderSnapshot {
                session_id,
                last,
                attempted,
            } => write!(
                f,
                "snapshot at {} precedes last snapshot {} of session #{}",
                attempted, last, session_id
            ),
            StorageError::SerializationError(msg) => write!(f, "row serialization error: {}", msg),
            StorageError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::IoError(io_err),
            sqlx::Error::RowNotFound => StorageError::QueryFailed("no rows found".to_string()),
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
