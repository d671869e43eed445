//! Workspace management library
//!
//! This crate owns the on-disk layout of the orchestrator: a single
//! root directory containing named project workspaces, plus the
//! commit-based version history of each workspace.

mod error;
mod model;
mod store;
mod versions;

pub use error::{Result, WorkspaceError};
pub use model::{FilePatch, PageVersion, WorkspaceInfo};
pub use store::{StoreConfig, WorkspaceStore};
pub use versions::VersionTracker;
