//! Boss coordinator
//!
//! Manages N concurrent agent "boss" sessions, each bound to exactly
//! one workspace: activation topologies, message routing and
//! persistence, resumption from previously used workspaces, and the
//! stale-workspace sweep. The [`OrchestratorService`] facade wires the
//! coordinator together with the workspace store, version tracker and
//! deploy pipeline.

mod agent;
mod coordinator;
mod debounce;
mod error;
mod message;
pub mod persistence;
mod service;
mod session;

pub use agent::{AgentKind, AgentLaunch, AgentProcess};
pub use coordinator::{CoordinatorConfig, CoordinatorEvent, SessionCoordinator};
pub use debounce::Debouncer;
pub use error::{CoordinatorError, Result};
pub use message::{parse_agent_line, BossMessage, MessageContent, MessageRole};
pub use service::OrchestratorService;
pub use session::{BossSession, SessionPhase, SessionRole};
