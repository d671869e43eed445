//! Error types for session coordination

use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Errors that can occur while coordinating sessions
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Referenced session does not exist
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// A session's workspace binding is immutable once set
    #[error("Session {session_id} is already bound to a workspace")]
    WorkspaceAlreadyBound { session_id: String },

    /// The agent process could not be launched at all
    #[error("Failed to spawn agent: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// No session exists to receive a message
    #[error("No active session")]
    NoActiveSession,

    /// Unknown agent kind string
    #[error("Invalid agent kind: {kind}")]
    InvalidAgentKind { kind: String },

    /// Workspace operation failed
    #[error("Workspace error: {0}")]
    Workspace(#[from] workspace_fs::WorkspaceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoordinatorError {
    /// Create a SpawnFailed error without a source
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a SpawnFailed error with an IO source
    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a SessionNotFound error
    pub fn session_not_found(session_id: impl ToString) -> Self {
        Self::SessionNotFound {
            session_id: session_id.to_string(),
        }
    }
}
