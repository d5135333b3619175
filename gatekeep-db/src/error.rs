//! Error types for database operations

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum Error {
    /// SQLx database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A status change was attempted out of a terminal state
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },
}

impl Error {
    /// Whether the durable store itself is unreachable or failing
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Error::Sqlx(_) | Error::Io(_) | Error::Migration(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, Error>;
