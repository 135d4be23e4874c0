use std::io;

use examda_core::gateway::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] examda_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Exam ID cannot be empty")]
    EmptyExamId,
    #[error("Invalid date/time '{0}': expected RFC 3339, e.g. 2026-06-01T09:00:00Z")]
    InvalidDateTime(String),
    #[error("Nothing to change; pass at least one field to edit")]
    EmptyEdit,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Credential storage error: {0}")]
    Credentials(String),
    #[error("Not signed in. Run `examda auth login --student-id <id> --password <password>`.")]
    NotSignedIn,
}
