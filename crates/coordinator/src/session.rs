//! Boss session - one agent process bound to one workspace

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentKind, AgentProcess};
use crate::error::{CoordinatorError, Result};
use crate::message::BossMessage;
use crate::persistence;

/// Session state machine
///
/// `Idle → Researching | Building → Stopped`. Builders go straight to
/// `Building` on their first message; a research session moves to
/// `Researching` and hands off to builders later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Researching,
    Building,
    Stopped,
}

/// What a session is for within the activation topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Research,
    Builder,
}

/// A live binding between one external agent and one workspace
///
/// The workspace binding is write-once: a new direction requires a new
/// session, never a rebind.
pub struct BossSession {
    pub id: Uuid,
    pub agent_kind: AgentKind,
    pub role: SessionRole,
    pub phase: SessionPhase,
    pub created_at: DateTime<Utc>,
    workspace_name: Option<String>,
    workspace_path: Option<PathBuf>,
    messages: Vec<BossMessage>,
    resume_token: Option<String>,
    process: Option<AgentProcess>,
}

impl BossSession {
    pub fn new(agent_kind: AgentKind, role: SessionRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_kind,
            role,
            phase: SessionPhase::Idle,
            created_at: Utc::now(),
            workspace_name: None,
            workspace_path: None,
            messages: Vec::new(),
            resume_token: None,
            process: None,
        }
    }

    /// Bind this session to a workspace; fails if already bound
    ///
    /// Messages appended before the binding (a handoff brief, for
    /// instance) are flushed to the workspace log so the on-disk
    /// history matches the in-memory one.
    pub fn bind_workspace(&mut self, name: impl Into<String>, path: PathBuf) -> Result<()> {
        if self.workspace_path.is_some() {
            return Err(CoordinatorError::WorkspaceAlreadyBound {
                session_id: self.id.to_string(),
            });
        }
        for message in &self.messages {
            persistence::append_message(&path, message)?;
        }
        self.workspace_name = Some(name.into());
        self.workspace_path = Some(path);
        Ok(())
    }

    pub fn workspace_name(&self) -> Option<&str> {
        self.workspace_name.as_deref()
    }

    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace_path.as_deref()
    }

    pub fn messages(&self) -> &[BossMessage] {
        &self.messages
    }

    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    /// Append a message, persisting it to the bound workspace
    pub fn append_message(&mut self, message: BossMessage) -> Result<()> {
        if let Some(path) = &self.workspace_path {
            persistence::append_message(path, &message)?;
        }
        self.messages.push(message);
        Ok(())
    }

    /// Replace the in-memory log with messages replayed from disk
    pub fn replay_messages(&mut self, messages: Vec<BossMessage>) {
        self.messages = messages;
    }

    pub fn set_resume_token(&mut self, token: Option<String>) {
        self.resume_token = token;
    }

    /// Hand ownership of a freshly spawned agent process to the session
    pub fn attach_process(&mut self, process: AgentProcess) {
        self.process = Some(process);
    }

    /// Whether an agent process is attached and still running
    pub fn has_live_process(&mut self) -> bool {
        match self.process.as_mut() {
            Some(p) => !p.is_finished(),
            None => false,
        }
    }

    /// Take the attached process, if any
    pub fn take_process(&mut self) -> Option<AgentProcess> {
        self.process.take()
    }

    /// Kill any attached agent process and mark the session stopped.
    /// Idempotent.
    pub async fn stop(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.kill().await;
        }
        self.phase = SessionPhase::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_session_starts_idle_and_unbound() {
        let session = BossSession::new(AgentKind::OpenCode, SessionRole::Builder);
        assert_eq!(session.phase, SessionPhase::Idle);
        assert!(session.workspace_path().is_none());
        assert!(session.messages().is_empty());
    }

    #[test]
    fn test_workspace_binding_is_write_once() {
        let dir = TempDir::new().unwrap();
        let mut session = BossSession::new(AgentKind::OpenCode, SessionRole::Builder);

        session
            .bind_workspace("session-a/v1", dir.path().to_path_buf())
            .unwrap();
        assert_eq!(session.workspace_name(), Some("session-a/v1"));

        let err = session
            .bind_workspace("session-b/v1", dir.path().to_path_buf())
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::WorkspaceAlreadyBound { .. }
        ));
    }

    #[test]
    fn test_append_persists_to_bound_workspace() {
        let dir = TempDir::new().unwrap();
        let mut session = BossSession::new(AgentKind::OpenCode, SessionRole::Builder);
        session
            .bind_workspace("demo", dir.path().to_path_buf())
            .unwrap();

        session.append_message(BossMessage::user("hello")).unwrap();

        let on_disk = persistence::load_messages(dir.path()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].text(), Some("hello"));
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_append_without_workspace_stays_in_memory() {
        let mut session = BossSession::new(AgentKind::OpenCode, SessionRole::Research);
        session.append_message(BossMessage::user("brief me")).unwrap();
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_bind_backfills_earlier_messages() {
        let dir = TempDir::new().unwrap();
        let mut session = BossSession::new(AgentKind::OpenCode, SessionRole::Builder);

        session
            .append_message(BossMessage::user("seeded brief"))
            .unwrap();
        session
            .bind_workspace("demo", dir.path().to_path_buf())
            .unwrap();
        session.append_message(BossMessage::user("build it")).unwrap();

        let on_disk = persistence::load_messages(dir.path()).unwrap();
        assert_eq!(on_disk.len(), session.messages().len());
        assert_eq!(on_disk[0].text(), Some("seeded brief"));
        assert_eq!(on_disk[1].text(), Some("build it"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_without_process() {
        let mut session = BossSession::new(AgentKind::OpenCode, SessionRole::Builder);
        session.stop().await;
        session.stop().await;
        assert_eq!(session.phase, SessionPhase::Stopped);
    }
}
