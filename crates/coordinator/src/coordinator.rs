//! Session coordinator - owns the concurrent boss sessions
//!
//! Topologies:
//! - single-agent: every builder receives each message and works
//!   independently in its own workspace
//! - two-phase: one research session receives messages until handoff,
//!   then builders take over, seeded with the research output
//!
//! All state changes are published on a broadcast channel; consumers
//! subscribe explicitly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use workspace_fs::WorkspaceStore;

use crate::agent::{AgentKind, AgentLaunch, AgentProcess};
use crate::debounce::Debouncer;
use crate::error::{CoordinatorError, Result};
use crate::message::{parse_agent_line, BossMessage};
use crate::persistence;
use crate::session::{BossSession, SessionPhase, SessionRole};

/// Configuration for the session coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long an ephemeral workspace may sit untouched before the
    /// stale sweep considers it abandoned
    pub retention: Duration,
    /// Delay before a scheduled workspace reload fires
    pub reload_debounce: Duration,
    /// Replace the agent binary with a fixed command (takes the
    /// instruction as its single argument); used by tests and dry runs
    pub agent_command_override: Option<String>,
    /// Extra environment passed to every agent process
    pub agent_env: Vec<(String, String)>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(24 * 60 * 60),
            reload_debounce: Duration::from_millis(500),
            agent_command_override: None,
            agent_env: Vec::new(),
        }
    }
}

/// State-change notifications published by the coordinator
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    SessionActivated { session_id: Uuid, role: SessionRole },
    SessionSelected { session_id: Uuid },
    MessageSent { session_id: Uuid },
    MessageReceived { session_id: Uuid },
    PhaseChanged { session_id: Uuid, phase: SessionPhase },
    ReloadRequested { workspace: String },
    SessionsCleared,
}

/// Message-routing state for the current activation
#[derive(Default)]
struct Routing {
    /// Builder session ids in activation order
    builders: Vec<Uuid>,
    research: Option<Uuid>,
    pinned: Option<Uuid>,
    selected: Option<Uuid>,
    handed_off: bool,
    /// Previously loaded project reference, cleared before the first
    /// message of a fresh single-agent session
    loaded_project: Option<String>,
    /// Short id shared by all workspaces of one activation
    activation_id: Option<String>,
}

/// Manages N concurrent agent sessions, each bound to one workspace
pub struct SessionCoordinator {
    store: Arc<WorkspaceStore>,
    config: CoordinatorConfig,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<RwLock<BossSession>>>>>,
    routing: RwLock<Routing>,
    events: broadcast::Sender<CoordinatorEvent>,
    debouncer: Debouncer,
}

// Lock order: the sessions map or an individual session lock may be
// held while taking `routing`, never the other way around.
impl SessionCoordinator {
    pub fn new(store: Arc<WorkspaceStore>, config: CoordinatorConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            routing: RwLock::new(Routing::default()),
            events,
            debouncer: Debouncer::new(),
        }
    }

    /// Subscribe to coordinator state changes
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    /// Tear down any existing sessions and create a fresh topology
    ///
    /// `count` builder sessions are created; a dedicated research
    /// session is added when more than one agent kind is requested.
    pub async fn activate(&self, count: usize, kinds: &[AgentKind]) -> Result<Vec<Uuid>> {
        self.stop_all().await;
        self.sessions.write().await.clear();

        let mut routing = Routing {
            activation_id: Some(format!("{:08x}", rand::random::<u32>())),
            ..Routing::default()
        };
        let mut ids = Vec::new();
        let mut created = Vec::new();

        if kinds.len() > 1 {
            let session = BossSession::new(kinds[0], SessionRole::Research);
            routing.research = Some(session.id);
            ids.push(session.id);
            created.push(session);
        }

        for i in 0..count {
            let kind = kinds
                .get(i % kinds.len().max(1))
                .copied()
                .unwrap_or(AgentKind::OpenCode);
            let session = BossSession::new(kind, SessionRole::Builder);
            routing.builders.push(session.id);
            ids.push(session.id);
            created.push(session);
        }

        {
            let mut sessions = self.sessions.write().await;
            for session in created {
                let _ = self.events.send(CoordinatorEvent::SessionActivated {
                    session_id: session.id,
                    role: session.role,
                });
                sessions.insert(session.id, Arc::new(RwLock::new(session)));
            }
        }
        *self.routing.write().await = routing;

        info!(
            "Activated {} builder sessions ({} kinds requested)",
            count,
            kinds.len()
        );
        Ok(ids)
    }

    /// Route a message per the current topology
    ///
    /// Research-first until handoff; a pinned builder receives
    /// exclusively; otherwise every builder receives the message.
    pub async fn send(&self, text: &str) -> Result<Vec<Uuid>> {
        // Session locks are taken before the routing lock, never while
        // holding it.
        let lone_builder = {
            let routing = self.routing.read().await;
            match routing.builders.as_slice() {
                [only] if routing.research.is_none() => Some(*only),
                _ => None,
            }
        };
        let fresh_single_agent = match lone_builder {
            Some(id) => self.is_unbound(id).await,
            None => false,
        };

        let targets = {
            let mut routing = self.routing.write().await;
            if routing.builders.is_empty() && routing.research.is_none() {
                return Err(CoordinatorError::NoActiveSession);
            }

            match (routing.research, routing.handed_off, routing.pinned) {
                (Some(research), false, _) => vec![research],
                (_, _, Some(pinned)) => vec![pinned],
                _ => {
                    // A fresh single-agent session's first message
                    // always starts a new workspace; drop any loaded
                    // project reference.
                    if fresh_single_agent && routing.loaded_project.take().is_some() {
                        debug!("Cleared loaded project before first message");
                    }
                    routing.builders.clone()
                }
            }
        };

        let sends = targets.iter().map(|id| self.send_to(*id, text));
        for result in futures::future::join_all(sends).await {
            result?;
        }
        Ok(targets)
    }

    /// Send a message to one session, spawning its agent process
    pub async fn send_to(&self, session_id: Uuid, text: &str) -> Result<()> {
        let session = self
            .session(session_id)
            .await
            .ok_or_else(|| CoordinatorError::session_not_found(session_id))?;

        let mut guard = session.write().await;

        let path = match guard.workspace_path() {
            Some(p) => p.to_path_buf(),
            None => {
                let name = self.allocate_workspace_name(&guard).await;
                let path = self.store.create(&name).await?;
                persistence::write_agent_name(&path, guard.agent_kind)?;
                guard.bind_workspace(name, path.clone())?;
                path
            }
        };

        guard.append_message(BossMessage::user(text))?;
        guard.phase = match guard.role {
            SessionRole::Research => SessionPhase::Researching,
            SessionRole::Builder => SessionPhase::Building,
        };

        // Sends within one session are serialized by the caller; a
        // process still attached here is a leftover from the previous
        // turn.
        if let Some(mut previous) = guard.take_process() {
            if !previous.is_finished() {
                warn!("Replacing still-running agent for session {}", session_id);
            }
            previous.kill().await;
        }

        let resume_token = persistence::read_session_token(&path);
        let launch = match &self.config.agent_command_override {
            Some(command) => AgentLaunch {
                command: command.clone(),
                args: vec![text.to_string()],
                working_dir: path,
                env: self.config.agent_env.clone(),
            },
            None => {
                let mut launch =
                    AgentLaunch::for_kind(guard.agent_kind, path, text, resume_token.as_deref());
                launch.env = self.config.agent_env.clone();
                launch
            }
        };

        let (line_tx, mut line_rx) = mpsc::channel(256);
        let process = AgentProcess::spawn(launch, line_tx).await?;
        guard.attach_process(process);
        let phase = guard.phase;
        drop(guard);

        // Agent output flows into the session's message log
        let reader_session = Arc::clone(&session);
        let reader_events = self.events.clone();
        tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                let Some(message) = parse_agent_line(&line) else {
                    continue;
                };
                if let Err(e) = reader_session.write().await.append_message(message) {
                    warn!("Failed to record agent output: {}", e);
                }
                let _ = reader_events.send(CoordinatorEvent::MessageReceived { session_id });
            }
        });

        let _ = self.events.send(CoordinatorEvent::MessageSent { session_id });
        let _ = self
            .events
            .send(CoordinatorEvent::PhaseChanged { session_id, phase });
        Ok(())
    }

    /// Pin message routing to one builder, or clear the pin
    pub async fn pin(&self, session_id: Option<Uuid>) -> Result<()> {
        if let Some(id) = session_id {
            if self.session(id).await.is_none() {
                return Err(CoordinatorError::session_not_found(id));
            }
        }
        self.routing.write().await.pinned = session_id;
        Ok(())
    }

    /// Hand off from the research session to the builders
    ///
    /// The research session is stopped and its last text output is
    /// seeded into every builder's message log. Idempotent.
    pub async fn handoff(&self) -> Result<()> {
        let research_id = {
            let mut routing = self.routing.write().await;
            if routing.handed_off {
                return Ok(());
            }
            routing.handed_off = true;
            routing.research
        };
        let Some(research_id) = research_id else {
            return Ok(());
        };

        let brief = match self.session(research_id).await {
            Some(session) => {
                let mut guard = session.write().await;
                let brief = guard
                    .messages()
                    .iter()
                    .rev()
                    .find_map(|m| match m.role {
                        crate::message::MessageRole::Assistant => m.text().map(String::from),
                        _ => None,
                    });
                guard.stop().await;
                brief
            }
            None => None,
        };
        let _ = self.events.send(CoordinatorEvent::PhaseChanged {
            session_id: research_id,
            phase: SessionPhase::Stopped,
        });

        if let Some(brief) = brief {
            let builders = self.routing.read().await.builders.clone();
            for builder_id in builders {
                if let Some(session) = self.session(builder_id).await {
                    session
                        .write()
                        .await
                        .append_message(BossMessage::user(brief.clone()))?;
                }
            }
        }

        info!("Research handed off to builders");
        Ok(())
    }

    /// Resume a workspace into a session
    ///
    /// A live session already bound to that workspace is selected
    /// as-is; otherwise a new session is rehydrated from the
    /// workspace's persisted message log, agent marker, and resume
    /// token.
    pub async fn resume(&self, workspace_name: &str) -> Result<Uuid> {
        let path = self.store.resolve(workspace_name)?;
        if !self.store.exists(workspace_name).await? {
            return Err(workspace_fs::WorkspaceError::not_found(workspace_name).into());
        }

        if let Some(live_id) = self.find_bound_session(&path).await {
            self.mark_selected(live_id, workspace_name).await;
            debug!("Selected live session {} for {}", live_id, workspace_name);
            return Ok(live_id);
        }

        let kind = persistence::read_agent_name(&path).unwrap_or(AgentKind::OpenCode);
        let messages = persistence::load_messages(&path)?;
        let token = persistence::read_session_token(&path);

        let mut session = BossSession::new(kind, SessionRole::Builder);
        session.bind_workspace(workspace_name, path)?;
        session.replay_messages(messages);
        session.set_resume_token(token);
        let id = session.id;

        self.sessions
            .write()
            .await
            .insert(id, Arc::new(RwLock::new(session)));
        {
            let mut routing = self.routing.write().await;
            routing.builders.push(id);
        }
        let _ = self.events.send(CoordinatorEvent::SessionActivated {
            session_id: id,
            role: SessionRole::Builder,
        });
        self.mark_selected(id, workspace_name).await;

        info!("Resumed workspace {} into session {}", workspace_name, id);
        Ok(id)
    }

    /// Select a session for a known workspace name
    ///
    /// Exact match on (session id, bound workspace path); anything else
    /// falls back to `resume` so workspace and session identity stay
    /// 1:1.
    pub async fn select(&self, session_id: Uuid, workspace_name: &str) -> Result<Uuid> {
        let path = self.store.resolve(workspace_name)?;
        if let Some(session) = self.session(session_id).await {
            if session.read().await.workspace_path() == Some(path.as_path()) {
                self.mark_selected(session_id, workspace_name).await;
                return Ok(session_id);
            }
        }
        self.resume(workspace_name).await
    }

    /// Sweep stale workspaces, then clear all in-memory session state
    ///
    /// On-disk workspaces bound to live sessions are excluded from the
    /// sweep; reset never deletes them, it only detaches.
    pub async fn reset(&self) -> Result<usize> {
        self.debouncer.cancel_all().await;
        self.stop_all().await;

        let bound = self.bound_workspace_paths().await;
        let removed = self
            .store
            .cleanup_stale(self.config.retention, &bound)
            .await?;

        self.sessions.write().await.clear();
        *self.routing.write().await = Routing::default();
        let _ = self.events.send(CoordinatorEvent::SessionsCleared);

        info!("Reset coordinator, swept {} stale workspaces", removed);
        Ok(removed)
    }

    /// Terminate every live agent process. Idempotent.
    pub async fn stop_all(&self) {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let stops = sessions.iter().map(|session| async {
            session.write().await.stop().await;
        });
        futures::future::join_all(stops).await;
    }

    /// Schedule a debounced reload notification for a workspace;
    /// a newer schedule for the same workspace supersedes a pending one
    pub async fn schedule_reload(&self, workspace_name: &str) {
        let events = self.events.clone();
        let workspace = workspace_name.to_string();
        self.debouncer
            .schedule(workspace_name, self.config.reload_debounce, async move {
                let _ = events.send(CoordinatorEvent::ReloadRequested { workspace });
            })
            .await;
    }

    /// Record a project reference for the next session to pick up
    pub async fn load_project(&self, workspace_name: &str) {
        self.routing.write().await.loaded_project = Some(workspace_name.to_string());
    }

    pub async fn loaded_project(&self) -> Option<String> {
        self.routing.read().await.loaded_project.clone()
    }

    /// Get a session by id
    pub async fn session(&self, session_id: Uuid) -> Option<Arc<RwLock<BossSession>>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Snapshot of (id, role, phase, workspace name) for every session
    pub async fn list_sessions(&self) -> Vec<(Uuid, SessionRole, SessionPhase, Option<String>)> {
        let sessions = self.sessions.read().await;
        let mut listed = Vec::with_capacity(sessions.len());
        for (id, session) in sessions.iter() {
            let guard = session.read().await;
            listed.push((
                *id,
                guard.role,
                guard.phase,
                guard.workspace_name().map(String::from),
            ));
        }
        listed
    }

    /// Paths of workspaces currently bound to a session
    pub async fn bound_workspace_paths(&self) -> Vec<PathBuf> {
        let sessions = self.sessions.read().await;
        let mut paths = Vec::new();
        for session in sessions.values() {
            if let Some(path) = session.read().await.workspace_path() {
                paths.push(path.to_path_buf());
            }
        }
        paths
    }

    async fn mark_selected(&self, session_id: Uuid, workspace_name: &str) {
        let mut routing = self.routing.write().await;
        routing.selected = Some(session_id);
        routing.loaded_project = Some(workspace_name.to_string());
        drop(routing);
        let _ = self
            .events
            .send(CoordinatorEvent::SessionSelected { session_id });
    }

    async fn find_bound_session(&self, path: &std::path::Path) -> Option<Uuid> {
        let sessions = self.sessions.read().await;
        for (id, session) in sessions.iter() {
            if session.read().await.workspace_path() == Some(path) {
                return Some(*id);
            }
        }
        None
    }

    async fn is_unbound(&self, session_id: Uuid) -> bool {
        match self.session(session_id).await {
            Some(session) => session.read().await.workspace_path().is_none(),
            None => false,
        }
    }

    /// Workspace name for a session's first binding
    ///
    /// Builders share the activation id and get `v1`, `v2`, … variant
    /// directories; the research session gets its own variant.
    async fn allocate_workspace_name(&self, session: &BossSession) -> String {
        let routing = self.routing.read().await;
        let activation = routing
            .activation_id
            .clone()
            .unwrap_or_else(|| format!("{:08x}", rand::random::<u32>()));
        let prefix = self.store.ephemeral_prefix();

        match session.role {
            SessionRole::Research => format!("{}{}/research", prefix, activation),
            SessionRole::Builder => {
                let index = routing
                    .builders
                    .iter()
                    .position(|id| *id == session.id)
                    .map(|i| i + 1)
                    .unwrap_or(1);
                format!("{}{}/v{}", prefix, activation, index)
            }
        }
    }
}
