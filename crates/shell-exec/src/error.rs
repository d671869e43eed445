//! Error types for shell execution

use thiserror::Error;

/// Result type alias for executor operations
pub type Result<T> = std::result::Result<T, ExecError>;

/// Errors that can occur while executing a shell command
///
/// A command that runs and exits non-zero is not an error; the exit
/// code is reported through `ShellResult`. Only a process that cannot
/// be launched at all fails the call.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The child process could not be spawned
    #[error("Failed to launch process: {message}")]
    LaunchFailure {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Create a LaunchFailure error
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self::LaunchFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Create a LaunchFailure error with source
    pub fn launch_failure_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::LaunchFailure {
            message: message.into(),
            source: Some(source),
        }
    }
}
