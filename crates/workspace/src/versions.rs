//! Commit-based version tracking for a workspace
//!
//! Wraps the shell executor to drive git inside one workspace
//! directory: checkpoint commits, the ordered version list, and
//! working-tree restores.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tracing::{debug, warn};

use shell_exec::{ProcessExecutor, ShellResult};

use crate::error::{Result, WorkspaceError};
use crate::model::PageVersion;

const GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Tracks restorable commit snapshots of a workspace
#[derive(Debug, Clone)]
pub struct VersionTracker {
    executor: Arc<ProcessExecutor>,
}

impl VersionTracker {
    pub fn new(executor: Arc<ProcessExecutor>) -> Self {
        Self { executor }
    }

    /// Initialize a repository in the workspace when none exists
    ///
    /// Returns true when a repository was created.
    pub async fn init_if_needed(&self, path: &Path) -> Result<bool> {
        if path.join(".git").is_dir() {
            return Ok(false);
        }

        self.git_checked(path, "git init").await?;
        debug!("Initialized repository in {:?}", path);
        Ok(true)
    }

    /// Set a local commit identity for an orchestrator-owned workspace
    ///
    /// Cloned repositories may have no usable identity; the user's
    /// global config is left untouched.
    async fn ensure_identity(&self, path: &Path) -> Result<()> {
        self.git_checked(path, "git config user.email orchestrator@localhost")
            .await?;
        self.git_checked(path, "git config user.name 'Workspace Orchestrator'")
            .await?;
        Ok(())
    }

    /// Stage all changes and commit them as a checkpoint
    ///
    /// Uses allow-empty-message semantics: an empty message still
    /// produces a checkpoint. The commit's own result is returned even
    /// when non-zero (e.g. nothing to commit) so callers can inspect
    /// the output.
    pub async fn commit(&self, path: &Path, message: &str) -> Result<ShellResult> {
        self.init_if_needed(path).await?;
        self.ensure_identity(path).await?;

        let add = self.git(path, "git add -A", &[]).await?;
        if !add.succeeded() {
            return Ok(add);
        }

        // Message is passed through the environment so arbitrary text
        // never reaches the shell line.
        self.git(
            path,
            "git commit --allow-empty-message -m \"$ORCH_COMMIT_MSG\"",
            &[("ORCH_COMMIT_MSG".to_string(), message.to_string())],
        )
        .await
    }

    /// List the workspace's versions, oldest first
    ///
    /// Sequence numbers are assigned by position starting at 1. A
    /// workspace with no repository or no commits yields an empty
    /// list; version history is optional.
    pub async fn list_versions(&self, path: &Path) -> Result<Vec<PageVersion>> {
        let result = self
            .git(path, "git log --reverse --format='%H%x09%ct%x09%s'", &[])
            .await?;

        if !result.succeeded() {
            // No repository or no commits yet
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for line in result.combined_output.lines() {
            let mut parts = line.splitn(3, '\t');
            let (Some(id), Some(epoch)) = (parts.next(), parts.next()) else {
                continue;
            };
            let subject = parts.next().unwrap_or("").trim();

            let created_at = epoch
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or_else(|| {
                    warn!("Unparseable commit timestamp {:?} in {:?}", epoch, path);
                    DateTime::UNIX_EPOCH
                });

            versions.push(PageVersion {
                id: id.trim().to_string(),
                version: versions.len() + 1,
                instruction: if subject.is_empty() {
                    None
                } else {
                    Some(subject.to_string())
                },
                created_at,
            });
        }

        Ok(versions)
    }

    /// Restore the working tree to the contents of a commit
    ///
    /// Overwrites tracked files only; the branch pointer does not
    /// move, so history (and version numbering) is unchanged.
    pub async fn restore(&self, path: &Path, commit_id: &str) -> Result<()> {
        if commit_id.is_empty() || !commit_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(WorkspaceError::git_failed(format!(
                "invalid commit id: {}",
                commit_id
            )));
        }

        self.git_checked(path, &format!("git checkout {} -- .", commit_id))
            .await?;
        debug!("Restored {:?} to {}", path, commit_id);
        Ok(())
    }

    async fn git(
        &self,
        path: &Path,
        command: &str,
        extra_env: &[(String, String)],
    ) -> Result<ShellResult> {
        let result = self
            .executor
            .execute(command, path, GIT_TIMEOUT, extra_env)
            .await?;
        Ok(result)
    }

    async fn git_checked(&self, path: &Path, command: &str) -> Result<ShellResult> {
        let result = self.git(path, command, &[]).await?;
        if !result.succeeded() {
            return Err(WorkspaceError::git_failed(format!(
                "`{}` failed: {}",
                command,
                result.combined_output.trim()
            )));
        }
        Ok(result)
    }
}
