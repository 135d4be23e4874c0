//! Error types for examda-core

use thiserror::Error;

use crate::gateway::RemoteError;

/// Result type alias using examda-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in examda-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local store used before it was opened
    #[error("Local store is not initialized")]
    StoreUnavailable,

    /// Exam lookup miss where an existing record was expected
    #[error("Exam not found: {0}")]
    RecordNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Any network or HTTP failure talking to the API
    #[error("Remote request failed: {0}")]
    RemoteRequestFailed(#[from] RemoteError),

    /// Platform notifier refused to schedule or cancel a reminder
    #[error("Notification error: {0}")]
    Notification(String),

    /// Action needs connectivity and the device is offline
    #[error("You are offline. {0} requires an internet connection.")]
    OfflineRequired(String),
}
