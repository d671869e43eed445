//! Agent process management
//!
//! External coding agents are opaque executables: they take a working
//! directory and either a fresh instruction or a resume token, write a
//! resumable session token into the workspace as a side effect, and
//! terminate (or block until stopped).

use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{CoordinatorError, Result};

/// Supported external agent kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    OpenCode,
    ClaudeCode,
    GeminiCli,
    Codex,
}

impl AgentKind {
    /// Parse an agent kind from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "opencode" => Ok(Self::OpenCode),
            "claude-code" | "claudecode" => Ok(Self::ClaudeCode),
            "gemini-cli" | "geminicli" | "gemini" => Ok(Self::GeminiCli),
            "codex" => Ok(Self::Codex),
            _ => Err(CoordinatorError::InvalidAgentKind {
                kind: s.to_string(),
            }),
        }
    }

    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenCode => "opencode",
            Self::ClaudeCode => "claude-code",
            Self::GeminiCli => "gemini-cli",
            Self::Codex => "codex",
        }
    }

    /// Get the command to run this agent
    pub fn command(&self) -> &'static str {
        match self {
            Self::OpenCode => "opencode",
            Self::ClaudeCode => "claude",
            Self::GeminiCli => "gemini",
            Self::Codex => "codex",
        }
    }

    /// Arguments for a fresh instruction or a resumed conversation
    pub fn args(&self, instruction: &str, resume_token: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = match self {
            Self::OpenCode => vec!["run".to_string()],
            Self::ClaudeCode => vec!["-p".to_string()],
            Self::GeminiCli => vec!["-p".to_string()],
            Self::Codex => vec!["exec".to_string()],
        };

        if let Some(token) = resume_token {
            match self {
                Self::OpenCode => {
                    args.push("--session".to_string());
                    args.push(token.to_string());
                }
                Self::ClaudeCode | Self::GeminiCli | Self::Codex => {
                    args.push("--resume".to_string());
                    args.push(token.to_string());
                }
            }
        }

        args.push(instruction.to_string());
        args
    }
}

/// Everything needed to start one agent process
#[derive(Debug, Clone)]
pub struct AgentLaunch {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl AgentLaunch {
    /// Launch description for an agent kind
    pub fn for_kind(
        kind: AgentKind,
        working_dir: PathBuf,
        instruction: &str,
        resume_token: Option<&str>,
    ) -> Self {
        Self {
            command: kind.command().to_string(),
            args: kind.args(instruction, resume_token),
            working_dir,
            env: Vec::new(),
        }
    }
}

/// A running agent process with its output readers
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    stdout_handle: tokio::task::JoinHandle<()>,
    stderr_handle: tokio::task::JoinHandle<()>,
}

impl AgentProcess {
    /// Spawn an agent process, forwarding its output lines into
    /// `line_tx`
    pub async fn spawn(launch: AgentLaunch, line_tx: mpsc::Sender<String>) -> Result<Self> {
        info!(
            "Spawning agent `{}` in {:?}",
            launch.command, launch.working_dir
        );

        let mut cmd = Command::new(&launch.command);
        cmd.args(&launch.args)
            .current_dir(&launch.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &launch.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            CoordinatorError::spawn_failed_with_source(
                format!("Failed to spawn `{}`: {}", launch.command, e),
                e,
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoordinatorError::spawn_failed("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CoordinatorError::spawn_failed("Failed to capture stderr"))?;

        let stdout_tx = line_tx.clone();
        let stdout_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("agent stdout: {}", line);
                if stdout_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("agent stderr: {}", line);
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            child,
            stdout_handle,
            stderr_handle,
        })
    }

    /// Get the process ID
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the process has already exited
    pub fn is_finished(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Wait for the process to exit, draining the output readers
    pub async fn wait(mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        let _ = self.stdout_handle.await;
        let _ = self.stderr_handle.await;
        Ok(status.code().unwrap_or(-1))
    }

    /// Kill the process; idempotent on an already-exited process
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill agent process: {}", e);
        }
        self.stdout_handle.abort();
        self.stderr_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_agent_kind_from_str() {
        assert_eq!(AgentKind::from_str("opencode").unwrap(), AgentKind::OpenCode);
        assert_eq!(
            AgentKind::from_str("claude-code").unwrap(),
            AgentKind::ClaudeCode
        );
        assert_eq!(AgentKind::from_str("gemini").unwrap(), AgentKind::GeminiCli);
        assert_eq!(AgentKind::from_str("codex").unwrap(), AgentKind::Codex);
        assert!(AgentKind::from_str("unknown").is_err());
    }

    #[test]
    fn test_resume_args_carry_token() {
        let fresh = AgentKind::OpenCode.args("do a thing", None);
        assert_eq!(fresh, vec!["run", "do a thing"]);

        let resumed = AgentKind::OpenCode.args("continue", Some("tok-1"));
        assert_eq!(resumed, vec!["run", "--session", "tok-1", "continue"]);
    }

    #[tokio::test]
    async fn test_spawn_forwards_output_lines() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let launch = AgentLaunch {
            command: "echo".to_string(),
            args: vec!["spawned-line".to_string()],
            working_dir: dir.path().to_path_buf(),
            env: vec![],
        };

        let process = AgentProcess::spawn(launch, tx).await.unwrap();
        let exit = process.wait().await.unwrap();

        assert_eq!(exit, 0);
        assert_eq!(rx.recv().await.unwrap(), "spawned-line");
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(16);

        let launch = AgentLaunch {
            command: "sleep".to_string(),
            args: vec!["30".to_string()],
            working_dir: dir.path().to_path_buf(),
            env: vec![],
        };

        let mut process = AgentProcess::spawn(launch, tx).await.unwrap();
        process.kill().await;
        process.kill().await;
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(16);

        let launch = AgentLaunch {
            command: "definitely-not-an-agent-binary".to_string(),
            args: vec![],
            working_dir: dir.path().to_path_buf(),
            env: vec![],
        };

        let err = AgentProcess::spawn(launch, tx).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::SpawnFailed { .. }));
    }
}
