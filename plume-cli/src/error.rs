//! Process-level error taxonomy for the CLI.

use std::io;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that abort the run with a non-zero exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The scratch file could not be prepared or written.
    #[error("scratch file error: {0}")]
    Sink(#[source] io::Error),

    /// Failure from the completion client (request setup, HTTP status).
    #[error(transparent)]
    Client(#[from] plume::Error),

    /// Terminal I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
