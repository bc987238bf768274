//! Error types for the cadence-executor crate.

use thiserror::Error;

/// Failures that happen before or while waiting on a child process.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command string was empty or whitespace.
    #[error("Invalid command: must be a non-empty string")]
    EmptyCommand,

    /// The child could not be spawned or waited on.
    #[error("Spawn error: {0}")]
    Spawn(#[from] std::io::Error),

    /// The child exited with a non-zero status.
    #[error("{0}")]
    Failed(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ExecError>;
