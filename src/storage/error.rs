//! Error types for storage operations

use std::fmt;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug)]
pub enum StorageError {
    /// Database connection failed
    ConnectionFailed(String),

    /// Database query failed
    QueryFailed(String),

    /// Migration failed
    MigrationFailed(String),

    /// A uniqueness constraint was hit (duplicate name or api key)
    Conflict(String),

    /// A stored value could not be mapped back into a row type
    InvalidData(String),

    /// JSON (de)serialization of an opaque column failed
    SerializationError(String),

    /// I/O error (file access, etc.)
    IoError(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to storage backend: {}", msg)
            }
            StorageError::QueryFailed(msg) => write!(f, "storage query failed: {}", msg),
            StorageError::MigrationFailed(msg) => write!(f, "database migration failed: {}", msg),
            StorageError::Conflict(msg) => write!(f, "conflicting record: {}", msg),
            StorageError::InvalidData(msg) => write!(f, "invalid stored data: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
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

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::IoError(io_err),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StorageError::Conflict(db_err.message().to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}
