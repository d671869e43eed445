//! Orchestrator service facade
//!
//! One instance is constructed at process start and passed by
//! reference to anything that needs it; there is no ambient global
//! lookup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use deploy_pipeline::{
    DeployAdapter, PipelineConfig, PipelineEvent, PipelineRequest, PipelineResult, PipelineRunner,
};
use shell_exec::ProcessExecutor;
use workspace_fs::{PageVersion, VersionTracker, WorkspaceInfo, WorkspaceStore};

use crate::agent::AgentKind;
use crate::coordinator::{CoordinatorConfig, CoordinatorEvent, SessionCoordinator};

/// Owns every orchestrator component over one workspace root
pub struct OrchestratorService {
    store: Arc<WorkspaceStore>,
    versions: Arc<VersionTracker>,
    runner: PipelineRunner,
    coordinator: SessionCoordinator,
}

impl OrchestratorService {
    pub fn new(
        root: impl Into<PathBuf>,
        adapter: Arc<dyn DeployAdapter>,
        pipeline_config: PipelineConfig,
        coordinator_config: CoordinatorConfig,
    ) -> Self {
        let store = Arc::new(WorkspaceStore::new(root));
        let executor = Arc::new(ProcessExecutor::default());
        let versions = Arc::new(VersionTracker::new(Arc::clone(&executor)));

        let runner = PipelineRunner::new(
            Arc::clone(&store),
            executor,
            Arc::clone(&versions),
            adapter,
            pipeline_config,
        );
        let coordinator = SessionCoordinator::new(Arc::clone(&store), coordinator_config);

        Self {
            store,
            versions,
            runner,
            coordinator,
        }
    }

    /// Run the build/deploy pipeline against a named workspace
    pub async fn run_pipeline(
        &self,
        request: PipelineRequest,
        progress: mpsc::Sender<PipelineEvent>,
    ) -> anyhow::Result<PipelineResult> {
        Ok(self.runner.run(request, progress).await?)
    }

    /// Enumerate project workspaces under the root
    pub async fn list_workspaces(&self) -> anyhow::Result<Vec<WorkspaceInfo>> {
        Ok(self.store.list().await?)
    }

    /// Version history of a workspace, oldest first
    pub async fn list_versions(&self, name: &str) -> anyhow::Result<Vec<PageVersion>> {
        let path = self.store.resolve(name)?;
        Ok(self.versions.list_versions(&path).await?)
    }

    /// Restore a workspace's files to a prior version
    pub async fn restore_version(&self, name: &str, commit_id: &str) -> anyhow::Result<()> {
        let path = self.store.resolve(name)?;
        self.versions.restore(&path, commit_id).await?;
        Ok(())
    }

    /// Activate a fresh session topology
    pub async fn activate_session(
        &self,
        count: usize,
        kinds: &[AgentKind],
    ) -> anyhow::Result<Vec<Uuid>> {
        Ok(self.coordinator.activate(count, kinds).await?)
    }

    /// Send a message into the active topology
    pub async fn send_message(&self, text: &str) -> anyhow::Result<Vec<Uuid>> {
        Ok(self.coordinator.send(text).await?)
    }

    /// Send a message to one specific session
    pub async fn send_message_to(&self, session_id: Uuid, text: &str) -> anyhow::Result<()> {
        Ok(self.coordinator.send_to(session_id, text).await?)
    }

    /// Resume a session from an existing workspace
    pub async fn resume_session(&self, workspace_name: &str) -> anyhow::Result<Uuid> {
        Ok(self.coordinator.resume(workspace_name).await?)
    }

    /// Sweep abandoned ephemeral workspaces, skipping anything bound
    /// to a live session
    pub async fn cleanup(&self, older_than: Duration) -> anyhow::Result<usize> {
        let bound = self.coordinator.bound_workspace_paths().await;
        Ok(self.store.cleanup_stale(older_than, &bound).await?)
    }

    /// Stop every live agent process
    pub async fn stop_all(&self) {
        self.coordinator.stop_all().await;
    }

    /// Subscribe to coordinator state changes
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.coordinator.subscribe()
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }
}
