//! Error types for repository operations.

use std::fmt;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug)]
pub enum RepositoryError {
    ConnectionFailed(String),
    QueryFailed(String),
    MigrationFailed(String),
    NotFound(String),
    SerializationError(String),
    IoError(std::io::Error),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to repository: {}", msg)
            }
            RepositoryError::QueryFailed(msg) => write!(f, "repository query failed: {}", msg),
            RepositoryError::MigrationFailed(msg) => {
                write!(f, "database migration failed: {}", msg)
            }
            RepositoryError::NotFound(msg) => write!(f, "not found: {}", msg),
            RepositoryError::SerializationError(msg) => {
                write!(f, "serialization error: {}", msg)
            }
            RepositoryError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepositoryError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::IoError(err)
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => RepositoryError::IoError(io_err),
            sqlx::Error::RowNotFound => RepositoryError::NotFound("no rows found".to_string()),
            other => RepositoryError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for RepositoryError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RepositoryError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::SerializationError(err.to_string())
    }
}
