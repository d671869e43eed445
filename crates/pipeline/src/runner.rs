//! Pipeline runner - drives the fixed stage sequence over one workspace

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use shell_exec::{ProcessExecutor, ShellResult};
use workspace_fs::{FilePatch, VersionTracker, WorkspaceStore};

use crate::adapter::{DeployAdapter, DeployMarker, DeployStatus};
use crate::error::{PipelineError, Result};
use crate::event::{PipelineEvent, Stage};

/// Configuration for the pipeline runner
///
/// Install and build are plain shell commands so callers can match
/// whatever toolchain the workspace uses.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub install_command: String,
    pub build_command: String,
    /// Timeout applied to each shell stage
    pub stage_timeout: Duration,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    /// Build-output directories probed for the deploy artifact, in
    /// order; the workspace root is the fallback
    pub artifact_dirs: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            install_command: "npm install --no-audit --no-fund".to_string(),
            build_command: "npm run build".to_string(),
            stage_timeout: Duration::from_secs(600),
            poll_attempts: 30,
            poll_interval: Duration::from_secs(2),
            artifact_dirs: vec!["dist".to_string(), "build".to_string(), "out".to_string()],
        }
    }
}

/// Where the workspace's initial contents come from
#[derive(Debug, Clone)]
pub enum SourceLocator {
    /// Clone an existing repository
    GitUrl { url: String },
    /// Start from an empty, version-controlled workspace
    Blank,
}

impl SourceLocator {
    /// Classify a source string: anything that looks like a clonable
    /// remote becomes a GitUrl, everything else a blank workspace.
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        if trimmed.starts_with("http://")
            || trimmed.starts_with("https://")
            || trimmed.starts_with("git@")
            || trimmed.ends_with(".git")
        {
            Self::GitUrl {
                url: trimmed.to_string(),
            }
        } else {
            Self::Blank
        }
    }
}

/// Request to run a pipeline against a named workspace
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub name: String,
    pub source: SourceLocator,
    pub branch: Option<String>,
    pub patches: Vec<FilePatch>,
    pub env_vars: Vec<(String, String)>,
}

/// Accumulator populated stage by stage during one run
///
/// Fields for stages that never ran stay `None`. On failure the
/// accumulator travels inside the stage error, so callers can still
/// show what the completed stages produced.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub clone_output: Option<String>,
    pub patch_count: Option<usize>,
    pub install_output: Option<String>,
    pub build_output: Option<String>,
    pub deploy_output: Option<String>,
    pub live_url: Option<String>,
}

/// Executes the fixed clone → patch → install → build → set-env →
/// deploy → resolve-domain sequence with fail-fast abort
pub struct PipelineRunner {
    store: Arc<WorkspaceStore>,
    executor: Arc<ProcessExecutor>,
    versions: Arc<VersionTracker>,
    adapter: Arc<dyn DeployAdapter>,
    config: PipelineConfig,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<WorkspaceStore>,
        executor: Arc<ProcessExecutor>,
        versions: Arc<VersionTracker>,
        adapter: Arc<dyn DeployAdapter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            executor,
            versions,
            adapter,
            config,
        }
    }

    /// Run the pipeline
    ///
    /// Stages execute strictly sequentially; each stage emits
    /// `StageStarted` before its work begins. The first failing stage
    /// aborts the run, and the deploy adapter is never touched after a
    /// pre-deploy failure. A `StageFailed` error carries the partial
    /// result accumulated by the stages that did complete.
    pub async fn run(
        &self,
        request: PipelineRequest,
        progress: mpsc::Sender<PipelineEvent>,
    ) -> Result<PipelineResult> {
        let mut result = PipelineResult::default();
        match self.run_stages(&request, &progress, &mut result).await {
            Ok(()) => Ok(result),
            Err(PipelineError::StageFailed { stage, output, .. }) => {
                Err(PipelineError::StageFailed {
                    stage,
                    output,
                    partial: Box::new(result),
                })
            }
            Err(other) => Err(other),
        }
    }

    async fn run_stages(
        &self,
        request: &PipelineRequest,
        progress: &mpsc::Sender<PipelineEvent>,
        result: &mut PipelineResult,
    ) -> Result<()> {
        let path = self.store.create(&request.name).await?;

        info!("Starting pipeline for workspace {}", request.name);

        // Stage: clone (acquire source)
        emit(progress, PipelineEvent::StageStarted { stage: Stage::Clone }).await;
        result.clone_output = Some(self.acquire_source(request, &path).await?);
        emit(progress, PipelineEvent::StageCompleted { stage: Stage::Clone }).await;

        // Stage: patch (only when patches were supplied)
        if !request.patches.is_empty() {
            emit(progress, PipelineEvent::StageStarted { stage: Stage::Patch }).await;
            let count = self
                .store
                .apply_patches(&request.name, &request.patches)
                .await?;
            result.patch_count = Some(count);

            let checkpoint = self
                .versions
                .commit(&path, &format!("Apply {} patches", count))
                .await?;
            if !checkpoint.succeeded() {
                warn!(
                    "Checkpoint commit after patching failed: {}",
                    checkpoint.combined_output.trim()
                );
            }
            emit(progress, PipelineEvent::StageCompleted { stage: Stage::Patch }).await;
        }

        // Stage: install
        emit(progress, PipelineEvent::StageStarted { stage: Stage::Install }).await;
        result.install_output = Some(self.install(&path).await?);
        emit(progress, PipelineEvent::StageCompleted { stage: Stage::Install }).await;

        // Stage: build
        emit(progress, PipelineEvent::StageStarted { stage: Stage::Build }).await;
        let build = self
            .shell(&self.config.build_command, &path, &request.env_vars)
            .await?;
        if !build.succeeded() {
            return Err(PipelineError::stage_failed(
                Stage::Build,
                build.combined_output,
            ));
        }
        result.build_output = Some(build.combined_output);
        emit(progress, PipelineEvent::StageCompleted { stage: Stage::Build }).await;

        // Stage: set-env (only when env vars were supplied)
        if !request.env_vars.is_empty() {
            emit(progress, PipelineEvent::StageStarted { stage: Stage::SetEnv }).await;
            let env_file: String = request
                .env_vars
                .iter()
                .map(|(k, v)| format!("{}={}\n", k, v))
                .collect();
            self.store.write_file(&request.name, ".env", &env_file).await?;
            emit(progress, PipelineEvent::StageCompleted { stage: Stage::SetEnv }).await;
        }

        // Stage: deploy
        emit(progress, PipelineEvent::StageStarted { stage: Stage::Deploy }).await;
        let baseline = self.read_marker(&request.name).await;
        let target_name = request.name.replace('/', "-");

        let target_id = self.adapter.create_target(&target_name).await?;
        let artifact = self.artifact_dir(&path);
        let deployment_id = self.adapter.push_artifact(&target_id, &artifact).await?;
        let status = self
            .adapter
            .poll_until_live(
                &deployment_id,
                self.config.poll_attempts,
                self.config.poll_interval,
            )
            .await?;

        if status != DeployStatus::Live {
            return Err(PipelineError::stage_failed(
                Stage::Deploy,
                format!("deployment {} ended in status {:?}", deployment_id, status),
            ));
        }
        result.deploy_output = Some(format!(
            "target {} deployment {} live",
            target_id, deployment_id
        ));
        emit(progress, PipelineEvent::StageCompleted { stage: Stage::Deploy }).await;

        // Stage: resolve-domain
        emit(
            progress,
            PipelineEvent::StageStarted {
                stage: Stage::ResolveDomain,
            },
        )
        .await;
        let url = self.adapter.resolve_public_url(&target_id).await?;

        let marker = DeployMarker {
            service_or_sandbox_id: target_id,
            url: url.clone(),
            created_at: chrono::Utc::now(),
        };
        let marker_file = DeployMarker::file_name(self.adapter.provider_name());
        self.store
            .write_file(
                &request.name,
                &marker_file,
                &serde_json::to_string_pretty(&marker)?,
            )
            .await?;

        if marker.is_new_against(baseline.as_ref()) {
            info!("New deployment produced for {}: {}", request.name, url);
        } else {
            warn!("Deploy for {} reproduced the previous deployment", request.name);
        }

        result.live_url = Some(url);
        emit(
            progress,
            PipelineEvent::StageCompleted {
                stage: Stage::ResolveDomain,
            },
        )
        .await;

        Ok(())
    }

    /// Clone the source repository or initialize a blank workspace
    async fn acquire_source(&self, request: &PipelineRequest, path: &Path) -> Result<String> {
        match &request.source {
            SourceLocator::GitUrl { url } => {
                // Url and branch travel through the environment so
                // arbitrary text never reaches the shell line.
                let mut env = vec![("ORCH_CLONE_URL".to_string(), url.clone())];
                let command = match &request.branch {
                    Some(branch) => {
                        env.push(("ORCH_CLONE_BRANCH".to_string(), branch.clone()));
                        r#"git clone --branch "$ORCH_CLONE_BRANCH" --single-branch "$ORCH_CLONE_URL" ."#
                    }
                    None => r#"git clone "$ORCH_CLONE_URL" ."#,
                };

                let clone = self.shell(command, path, &env).await?;
                if !clone.succeeded() {
                    return Err(PipelineError::stage_failed(
                        Stage::Clone,
                        clone.combined_output,
                    ));
                }
                Ok(clone.combined_output)
            }
            SourceLocator::Blank => {
                self.versions.init_if_needed(path).await?;
                Ok("initialized blank workspace".to_string())
            }
        }
    }

    /// Install dependencies, skipping with a note when the workspace
    /// has no dependency manifest
    async fn install(&self, path: &Path) -> Result<String> {
        if !path.join("package.json").is_file() {
            return Ok("no dependency manifest, install skipped".to_string());
        }

        let install = self.shell(&self.config.install_command, path, &[]).await?;
        if !install.succeeded() {
            return Err(PipelineError::stage_failed(
                Stage::Install,
                install.combined_output,
            ));
        }
        Ok(install.combined_output)
    }

    async fn shell(
        &self,
        command: &str,
        path: &Path,
        env: &[(String, String)],
    ) -> Result<ShellResult> {
        let result = self
            .executor
            .execute(command, path, self.config.stage_timeout, env)
            .await?;
        Ok(result)
    }

    async fn read_marker(&self, name: &str) -> Option<DeployMarker> {
        let file = DeployMarker::file_name(self.adapter.provider_name());
        match self.store.read_file(name, &file).await {
            Ok(content) => serde_json::from_str(&content).ok(),
            Err(_) => None,
        }
    }

    fn artifact_dir(&self, path: &Path) -> PathBuf {
        for dir in &self.config.artifact_dirs {
            let candidate = path.join(dir);
            if candidate.is_dir() {
                return candidate;
            }
        }
        path.to_path_buf()
    }
}

async fn emit(progress: &mpsc::Sender<PipelineEvent>, event: PipelineEvent) {
    // A caller that dropped its receiver just stops seeing progress
    let _ = progress.send(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct MockAdapter {
        created: AtomicUsize,
        pushed: AtomicUsize,
        polled: AtomicUsize,
        resolved: AtomicUsize,
        status: DeployStatus,
    }

    impl MockAdapter {
        fn new(status: DeployStatus) -> Arc<Self> {
            Arc::new(Self {
                created: AtomicUsize::new(0),
                pushed: AtomicUsize::new(0),
                polled: AtomicUsize::new(0),
                resolved: AtomicUsize::new(0),
                status,
            })
        }
    }

    #[async_trait]
    impl DeployAdapter for MockAdapter {
        fn provider_name(&self) -> &str {
            "mock"
        }

        async fn create_target(&self, name: &str) -> Result<String> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("target-{}", name))
        }

        async fn push_artifact(&self, _target_id: &str, _dir: &Path) -> Result<String> {
            self.pushed.fetch_add(1, Ordering::SeqCst);
            Ok("deploy-1".to_string())
        }

        async fn poll_until_live(
            &self,
            _deployment_id: &str,
            _max_attempts: u32,
            _interval: Duration,
        ) -> Result<DeployStatus> {
            self.polled.fetch_add(1, Ordering::SeqCst);
            Ok(self.status)
        }

        async fn resolve_public_url(&self, _target_id: &str) -> Result<String> {
            self.resolved.fetch_add(1, Ordering::SeqCst);
            Ok("https://demo.example".to_string())
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            install_command: "echo install-ok".to_string(),
            build_command: "echo build-ok".to_string(),
            stage_timeout: Duration::from_secs(60),
            poll_attempts: 1,
            poll_interval: Duration::from_millis(1),
            ..PipelineConfig::default()
        }
    }

    fn build_runner(
        root: &Path,
        adapter: Arc<MockAdapter>,
        config: PipelineConfig,
    ) -> (PipelineRunner, Arc<WorkspaceStore>) {
        let store = Arc::new(WorkspaceStore::new(root));
        let executor = Arc::new(ProcessExecutor::default());
        let versions = Arc::new(VersionTracker::new(Arc::clone(&executor)));
        let runner = PipelineRunner::new(
            Arc::clone(&store),
            executor,
            versions,
            adapter,
            config,
        );
        (runner, store)
    }

    fn drain_stages(rx: &mut mpsc::Receiver<PipelineEvent>) -> Vec<Stage> {
        let mut started = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::StageStarted { stage } = event {
                started.push(stage);
            }
        }
        started
    }

    /// Create a local git repository usable as a clone source
    async fn seed_source_repo(root: &Path) -> String {
        let store = WorkspaceStore::new(root);
        let path = store.create("origin").await.unwrap();
        store
            .write_file("origin", "index.html", "<h1>seed</h1>")
            .await
            .unwrap();
        store
            .write_file("origin", "package.json", "{\"name\":\"seed\"}")
            .await
            .unwrap();

        let versions = VersionTracker::new(Arc::new(ProcessExecutor::default()));
        let commit = versions.commit(&path, "seed").await.unwrap();
        assert!(commit.succeeded(), "{}", commit.combined_output);

        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_blank_pipeline_happy_path() {
        let dir = TempDir::new().unwrap();
        let adapter = MockAdapter::new(DeployStatus::Live);
        let (runner, store) = build_runner(dir.path(), Arc::clone(&adapter), test_config());

        let request = PipelineRequest {
            name: "demo".to_string(),
            source: SourceLocator::Blank,
            branch: None,
            patches: vec![FilePatch::Write {
                path: "package.json".to_string(),
                content: "{}".to_string(),
            }],
            env_vars: vec![("API_KEY".to_string(), "secret".to_string())],
        };

        let (tx, mut rx) = mpsc::channel(64);
        let result = runner.run(request, tx).await.unwrap();

        assert!(result.clone_output.is_some());
        assert_eq!(result.patch_count, Some(1));
        assert!(result.install_output.unwrap().contains("install-ok"));
        assert!(result.build_output.unwrap().contains("build-ok"));
        assert!(result.deploy_output.is_some());
        assert_eq!(result.live_url.as_deref(), Some("https://demo.example"));

        assert_eq!(adapter.created.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.pushed.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.resolved.load(Ordering::SeqCst), 1);

        // Marker and env file land in the workspace
        let marker = store.read_file("demo", "mock.json").await.unwrap();
        let marker: DeployMarker = serde_json::from_str(&marker).unwrap();
        assert_eq!(marker.url, "https://demo.example");
        assert!(store
            .read_file("demo", ".env")
            .await
            .unwrap()
            .contains("API_KEY=secret"));

        let stages = drain_stages(&mut rx);
        assert_eq!(
            stages,
            vec![
                Stage::Clone,
                Stage::Patch,
                Stage::Install,
                Stage::Build,
                Stage::SetEnv,
                Stage::Deploy,
                Stage::ResolveDomain,
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_build_aborts_before_deploy() {
        let dir = TempDir::new().unwrap();
        let source = seed_source_repo(dir.path()).await;

        let adapter = MockAdapter::new(DeployStatus::Live);
        let config = PipelineConfig {
            build_command: "exit 1".to_string(),
            ..test_config()
        };
        let (runner, store) = build_runner(dir.path(), Arc::clone(&adapter), config);

        let request = PipelineRequest {
            name: "demo".to_string(),
            source: SourceLocator::GitUrl { url: source },
            branch: None,
            patches: vec![],
            env_vars: vec![],
        };

        let (tx, mut rx) = mpsc::channel(64);
        let err = runner.run(request, tx).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Build));
        // The clone happened; the adapter was never touched
        let partial = err.partial().unwrap();
        assert!(!partial.clone_output.as_deref().unwrap().is_empty());
        assert!(partial.install_output.is_some());
        assert!(partial.build_output.is_none());
        assert!(partial.deploy_output.is_none());
        assert_eq!(
            store.read_file("demo", "index.html").await.unwrap(),
            "<h1>seed</h1>"
        );
        assert_eq!(adapter.created.load(Ordering::SeqCst), 0);
        assert_eq!(adapter.pushed.load(Ordering::SeqCst), 0);

        let stages = drain_stages(&mut rx);
        assert_eq!(stages, vec![Stage::Clone, Stage::Install, Stage::Build]);
    }

    #[tokio::test]
    async fn test_failing_install_carries_output() {
        let dir = TempDir::new().unwrap();
        let adapter = MockAdapter::new(DeployStatus::Live);
        let config = PipelineConfig {
            install_command: "echo broken-lockfile; exit 1".to_string(),
            ..test_config()
        };
        let (runner, _store) = build_runner(dir.path(), Arc::clone(&adapter), config);

        let request = PipelineRequest {
            name: "demo".to_string(),
            source: SourceLocator::Blank,
            branch: None,
            patches: vec![FilePatch::Write {
                path: "package.json".to_string(),
                content: "{}".to_string(),
            }],
            env_vars: vec![],
        };

        let (tx, _rx) = mpsc::channel(64);
        let err = runner.run(request, tx).await.unwrap_err();

        match err {
            PipelineError::StageFailed {
                stage,
                output,
                partial,
            } => {
                assert_eq!(stage, Stage::Install);
                assert!(output.contains("broken-lockfile"));
                assert!(partial.clone_output.is_some());
                assert!(partial.install_output.is_none());
                assert!(partial.build_output.is_none());
                assert!(partial.deploy_output.is_none());
            }
            other => panic!("Expected StageFailed, got {:?}", other),
        }
        assert_eq!(adapter.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_install_skipped_without_manifest() {
        let dir = TempDir::new().unwrap();
        let adapter = MockAdapter::new(DeployStatus::Live);
        let (runner, _store) = build_runner(dir.path(), Arc::clone(&adapter), test_config());

        let request = PipelineRequest {
            name: "demo".to_string(),
            source: SourceLocator::Blank,
            branch: None,
            patches: vec![],
            env_vars: vec![],
        };

        let (tx, _rx) = mpsc::channel(64);
        let result = runner.run(request, tx).await.unwrap();
        assert!(result.install_output.unwrap().contains("skipped"));
        assert!(result.patch_count.is_none());
    }

    #[tokio::test]
    async fn test_deploy_not_live_fails_deploy_stage() {
        let dir = TempDir::new().unwrap();
        let adapter = MockAdapter::new(DeployStatus::Failed);
        let (runner, _store) = build_runner(dir.path(), Arc::clone(&adapter), test_config());

        let request = PipelineRequest {
            name: "demo".to_string(),
            source: SourceLocator::Blank,
            branch: None,
            patches: vec![],
            env_vars: vec![],
        };

        let (tx, _rx) = mpsc::channel(64);
        let err = runner.run(request, tx).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Deploy));
        assert_eq!(adapter.pushed.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.resolved.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clone_from_local_repository() {
        let dir = TempDir::new().unwrap();
        let source = seed_source_repo(dir.path()).await;

        let adapter = MockAdapter::new(DeployStatus::Live);
        let (runner, store) = build_runner(dir.path(), Arc::clone(&adapter), test_config());

        let request = PipelineRequest {
            name: "clone-target".to_string(),
            source: SourceLocator::GitUrl { url: source },
            branch: None,
            patches: vec![],
            env_vars: vec![],
        };

        let (tx, _rx) = mpsc::channel(64);
        let result = runner.run(request, tx).await.unwrap();

        assert!(!result.clone_output.unwrap().is_empty());
        assert_eq!(
            store.read_file("clone-target", "index.html").await.unwrap(),
            "<h1>seed</h1>"
        );
    }

    #[test]
    fn test_source_locator_parse() {
        assert!(matches!(
            SourceLocator::parse("https://example/repo.git"),
            SourceLocator::GitUrl { .. }
        ));
        assert!(matches!(
            SourceLocator::parse("git@host:team/repo.git"),
            SourceLocator::GitUrl { .. }
        ));
        assert!(matches!(
            SourceLocator::parse("fresh page"),
            SourceLocator::Blank
        ));
    }
}
