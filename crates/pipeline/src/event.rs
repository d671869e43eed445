//! Pipeline stages and progress events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed, ordered pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Clone,
    Patch,
    Install,
    Build,
    SetEnv,
    Deploy,
    ResolveDomain,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Patch => "patch",
            Self::Install => "install",
            Self::Build => "build",
            Self::SetEnv => "set_env",
            Self::Deploy => "deploy",
            Self::ResolveDomain => "resolve_domain",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress events emitted while a pipeline runs
///
/// `StageStarted` is sent before the stage's work begins so a caller
/// can render the current step without waiting for completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted { stage: Stage },
    StageCompleted { stage: Stage },
    Log { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_serializes_snake_case() {
        let value = serde_json::to_value(Stage::ResolveDomain).unwrap();
        assert_eq!(value, serde_json::json!("resolve_domain"));
        assert_eq!(Stage::SetEnv.to_string(), "set_env");
    }
}
