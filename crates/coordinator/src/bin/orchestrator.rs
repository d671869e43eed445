//! Orchestrator entry point
//!
//! Constructs the service once and prints the workspace inventory;
//! intended as the wiring example for embedding the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boss_coordinator::{CoordinatorConfig, OrchestratorService};
use deploy_pipeline::{HttpDeployAdapter, PipelineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boss_coordinator=debug,deploy_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root = std::env::var("ORCH_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".orchestrator"));
    let deploy_url =
        std::env::var("DEPLOY_API_URL").unwrap_or_else(|_| "http://localhost:9000".to_string());
    let deploy_token = std::env::var("DEPLOY_API_TOKEN").unwrap_or_default();

    tracing::info!("Using workspace root: {:?}", root);

    let adapter = Arc::new(HttpDeployAdapter::new("sandbox", deploy_url, deploy_token));
    let service = OrchestratorService::new(
        root,
        adapter,
        PipelineConfig::default(),
        CoordinatorConfig::default(),
    );

    let workspaces = service.list_workspaces().await?;
    println!("{}", serde_json::to_string_pretty(&workspaces)?);

    Ok(())
}
