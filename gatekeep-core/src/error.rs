//! Error types for Gatekeep

use thiserror::Error;

/// Result type alias for Gatekeep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Gatekeep operations
#[derive(Error, Debug)]
pub enum Error {
    /// Review queue storage error
    #[error(transparent)]
    Db(#[from] gatekeep_db::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Decision-assist capability failed or was unreachable
    #[error("Advisor error: {0}")]
    Advisor(String),

    /// Required tests failed or could not run
    #[error("Test gate error: {0}")]
    TestGate(String),

    /// Merge/integration step failed
    #[error("Integration error: {0}")]
    Integration(String),

    /// Outbound notification could not be delivered
    #[error("Notification error: {0}")]
    Notify(String),

    /// An external call exceeded its time bound
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the durable queue store is failing
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Error::Db(e) if e.is_persistence_failure())
    }
}
