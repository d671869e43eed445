//! Error types for pipeline execution

use thiserror::Error;

use crate::event::Stage;
use crate::runner::PipelineResult;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur during a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage exited non-zero; the run is aborted and later stages
    /// are never attempted. The captured output is surfaced verbatim,
    /// it is the primary debugging signal. `partial` holds whatever
    /// the stages before the failure produced.
    #[error("Stage `{stage}` failed:\n{output}")]
    StageFailed {
        stage: Stage,
        output: String,
        partial: Box<PipelineResult>,
    },

    /// Deploy-adapter network or API failure; never retried by the core
    #[error("Deploy provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    /// Workspace operation failed
    #[error("Workspace error: {0}")]
    Workspace(#[from] workspace_fs::WorkspaceError),

    /// Shell execution failed
    #[error("Exec error: {0}")]
    Exec(#[from] shell_exec::ExecError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Create a StageFailed error
    pub fn stage_failed(stage: Stage, output: impl Into<String>) -> Self {
        Self::StageFailed {
            stage,
            output: output.into(),
            partial: Box::default(),
        }
    }

    /// Create a Provider error
    pub fn provider(status: u16, body: impl Into<String>) -> Self {
        Self::Provider {
            status,
            body: body.into(),
        }
    }

    /// The failed stage, when this error aborted one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The results of the stages that completed before the failure
    pub fn partial(&self) -> Option<&PipelineResult> {
        match self {
            Self::StageFailed { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
