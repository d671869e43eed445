//! Error types for workspace operations

use thiserror::Error;

/// Result type alias for workspace operations
pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Errors that can occur during workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Referenced workspace or file does not exist
    #[error("Not found: {name}")]
    NotFound { name: String },

    /// Workspace name is not a valid relative path
    #[error("Invalid workspace name: {name}")]
    InvalidName { name: String },

    /// Git command exited non-zero
    #[error("Git command failed: {message}")]
    GitFailed { message: String },

    /// Shell execution failed
    #[error("Exec error: {0}")]
    Exec(#[from] shell_exec::ExecError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkspaceError {
    /// Create a NotFound error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a GitFailed error
    pub fn git_failed(message: impl Into<String>) -> Self {
        Self::GitFailed {
            message: message.into(),
        }
    }
}
