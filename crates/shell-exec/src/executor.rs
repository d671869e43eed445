//! Process execution with timeout and environment control

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{ExecError, Result};

/// Exit code reported when a command is killed on timeout
///
/// Matches the convention of GNU `timeout`. A timed-out command is not
/// a distinct error; callers observe it via this exit code.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Output from a completed (or timed-out) shell command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellResult {
    pub exit_code: i32,
    /// Stdout and stderr interleaved in arrival order
    pub combined_output: String,
}

impl ShellResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Configuration for ProcessExecutor
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Directories merged ahead of the inherited PATH
    pub extra_paths: Vec<PathBuf>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            extra_paths: default_tool_paths(),
        }
    }
}

/// Common user-level tool install locations
///
/// Prepending these keeps command resolution reproducible regardless
/// of the caller's shell configuration.
fn default_tool_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        for rel in [".local/bin", ".cargo/bin", ".bun/bin", ".deno/bin"] {
            paths.push(home.join(rel));
        }
    }

    paths.push(PathBuf::from("/usr/local/bin"));
    paths.push(PathBuf::from("/opt/homebrew/bin"));
    paths
}

/// Runs shell commands in a working directory with a bounded lifetime
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    config: ExecConfig,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(ExecConfig::default())
    }
}

impl ProcessExecutor {
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    /// Execute a command under a login shell
    ///
    /// Stdout and stderr are captured interleaved into one buffer. On
    /// timeout the process is killed and the captured output is
    /// returned with [`TIMEOUT_EXIT_CODE`].
    pub async fn execute(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
        extra_env: &[(String, String)],
    ) -> Result<ShellResult> {
        debug!("Running `{}` in {:?}", command, working_dir);

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            // Login shell so user-level tool installs resolve
            let mut c = Command::new("bash");
            c.arg("-lc").arg(command);
            c
        };

        cmd.current_dir(working_dir)
            .env("PATH", self.merged_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in extra_env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ExecError::launch_failure_with_source(format!("Failed to spawn `{}`: {}", command, e), e)
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::launch_failure("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::launch_failure("Failed to capture stderr"))?;

        // Both streams feed one channel; the collector preserves
        // arrival order.
        let (line_tx, mut line_rx) = mpsc::channel::<String>(256);

        let stdout_tx = line_tx.clone();
        let stdout_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("stdout: {}", line);
                if stdout_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("stderr: {}", line);
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let collector = tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(line) = line_rx.recv().await {
                buffer.push_str(&line);
                buffer.push('\n');
            }
            buffer
        });

        let started = Instant::now();
        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(
                    "Command `{}` exceeded timeout of {:?}, killing",
                    command, timeout
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed-out process: {}", e);
                }
                let _ = child.wait().await;
                None
            }
        };

        let _ = stdout_handle.await;
        let _ = stderr_handle.await;
        let combined_output = collector.await.unwrap_or_default();

        let exit_code = match status {
            Some(status) => status.code().unwrap_or(-1),
            None => TIMEOUT_EXIT_CODE,
        };

        debug!(
            "Command finished with exit code {} after {:?}",
            exit_code,
            started.elapsed()
        );

        Ok(ShellResult {
            exit_code,
            combined_output,
        })
    }

    /// Extra tool directories merged ahead of the inherited PATH
    fn merged_path(&self) -> std::ffi::OsString {
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = self.config.extra_paths.clone();
        paths.extend(std::env::split_paths(&inherited));
        std::env::join_paths(paths).unwrap_or(inherited)
    }
}
