//! Deploy adapter interface and a generic HTTP implementation
//!
//! The pipeline never embeds provider-specific wire formats; it calls
//! this four-method surface and records the outcome in a marker file
//! inside the workspace.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Status reported by a provider for a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Live,
    Pending,
    Failed,
}

/// Narrow surface through which provider hosting APIs are invoked
#[async_trait]
pub trait DeployAdapter: Send + Sync {
    /// Provider identifier, used to name the marker file
    fn provider_name(&self) -> &str;

    /// Create (or look up) a deploy target, returning its id
    async fn create_target(&self, name: &str) -> Result<String>;

    /// Upload the built artifact directory, returning a deployment id
    async fn push_artifact(&self, target_id: &str, dir: &Path) -> Result<String>;

    /// Poll the deployment until it reports live, fails, or attempts
    /// run out (in which case the last status is returned)
    async fn poll_until_live(
        &self,
        deployment_id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<DeployStatus>;

    /// Resolve the public URL of a target
    async fn resolve_public_url(&self, target_id: &str) -> Result<String>;
}

/// Provider-result marker written into a deployed workspace
///
/// The canonical source of truth for "was a new deployment produced":
/// compared against a baseline snapshot taken before the deploy was
/// triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployMarker {
    pub service_or_sandbox_id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl DeployMarker {
    /// Marker file name for a provider (`<provider>.json`)
    pub fn file_name(provider: &str) -> String {
        format!("{}.json", provider)
    }

    /// Whether this marker represents a deployment the baseline did
    /// not already record
    pub fn is_new_against(&self, baseline: Option<&DeployMarker>) -> bool {
        match baseline {
            None => true,
            Some(b) => {
                b.service_or_sandbox_id != self.service_or_sandbox_id
                    || b.url != self.url
                    || b.created_at != self.created_at
            }
        }
    }
}

/// Generic JSON-over-HTTP deploy adapter
///
/// Speaks a plain REST shape (`/targets`, `/targets/{id}/deployments`,
/// `/deployments/{id}`, `/targets/{id}/domain`) with an opaque bearer
/// credential. Providers with richer APIs get their own adapter; the
/// pipeline does not care.
pub struct HttpDeployAdapter {
    provider: String,
    base_url: String,
    bearer_token: String,
    client: reqwest::Client,
}

impl HttpDeployAdapter {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        bearer_token: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn post_json(&self, url: String, body: serde_json::Value) -> Result<serde_json::Value> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bearer_token)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }

    async fn get_json(&self, url: String) -> Result<serde_json::Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }
}

#[async_trait]
impl DeployAdapter for HttpDeployAdapter {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn create_target(&self, name: &str) -> Result<String> {
        let body = self
            .post_json(
                format!("{}/targets", self.base_url),
                json!({ "name": name }),
            )
            .await?;
        string_field(&body, "id")
    }

    async fn push_artifact(&self, target_id: &str, dir: &Path) -> Result<String> {
        let files = collect_artifact_files(dir)?;
        info!(
            "Pushing {} files from {:?} to target {}",
            files.len(),
            dir,
            target_id
        );

        let body = self
            .post_json(
                format!("{}/targets/{}/deployments", self.base_url, target_id),
                json!({ "files": files }),
            )
            .await?;
        string_field(&body, "id")
    }

    async fn poll_until_live(
        &self,
        deployment_id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<DeployStatus> {
        let mut last = DeployStatus::Pending;

        for attempt in 0..max_attempts {
            let body = self
                .get_json(format!("{}/deployments/{}", self.base_url, deployment_id))
                .await?;

            last = match body["status"].as_str() {
                Some("live") | Some("ready") => DeployStatus::Live,
                Some("failed") | Some("error") => DeployStatus::Failed,
                _ => DeployStatus::Pending,
            };

            match last {
                DeployStatus::Live | DeployStatus::Failed => return Ok(last),
                DeployStatus::Pending => {
                    debug!(
                        "Deployment {} still pending (attempt {}/{})",
                        deployment_id,
                        attempt + 1,
                        max_attempts
                    );
                    tokio::time::sleep(interval).await;
                }
            }
        }

        Ok(last)
    }

    async fn resolve_public_url(&self, target_id: &str) -> Result<String> {
        let body = self
            .get_json(format!("{}/targets/{}/domain", self.base_url, target_id))
            .await?;
        string_field(&body, "url")
    }
}

fn request_error(e: reqwest::Error) -> PipelineError {
    let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
    PipelineError::provider(status, e.to_string())
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PipelineError::provider(status.as_u16(), body));
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(request_error)
}

fn string_field(body: &serde_json::Value, field: &str) -> Result<String> {
    body[field]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| PipelineError::provider(0, format!("response missing `{}` field", field)))
}

/// Collect the non-hidden text files of an artifact directory as a
/// path-to-content map
fn collect_artifact_files(dir: &Path) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut files = serde_json::Map::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)?.flatten() {
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    files.insert(
                        relative.to_string_lossy().to_string(),
                        serde_json::Value::String(content),
                    );
                }
                Err(e) => {
                    warn!("Skipping unreadable artifact file {:?}: {}", path, e);
                }
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: &str, url: &str, at: DateTime<Utc>) -> DeployMarker {
        DeployMarker {
            service_or_sandbox_id: id.to_string(),
            url: url.to_string(),
            created_at: at,
        }
    }

    #[test]
    fn test_marker_is_new_without_baseline() {
        let m = marker("svc-1", "https://a.example", Utc::now());
        assert!(m.is_new_against(None));
    }

    #[test]
    fn test_marker_unchanged_is_not_new() {
        let at = Utc::now();
        let m = marker("svc-1", "https://a.example", at);
        let baseline = marker("svc-1", "https://a.example", at);
        assert!(!m.is_new_against(Some(&baseline)));
    }

    #[test]
    fn test_marker_new_on_any_field_change() {
        let at = Utc::now();
        let baseline = marker("svc-1", "https://a.example", at);

        assert!(marker("svc-2", "https://a.example", at).is_new_against(Some(&baseline)));
        assert!(marker("svc-1", "https://b.example", at).is_new_against(Some(&baseline)));
    }

    #[test]
    fn test_marker_file_name() {
        assert_eq!(DeployMarker::file_name("sandbox"), "sandbox.json");
    }

    #[test]
    fn test_marker_serializes_in_camel_case() {
        let m = marker("svc-1", "https://a.example", Utc::now());
        let value = serde_json::to_value(&m).unwrap();
        assert!(value.get("serviceOrSandboxId").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("service_or_sandbox_id").is_none());
    }

    #[test]
    fn test_collect_artifact_files_skips_hidden() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("HEAD"), "ref").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets").join("app.js"), "1;").unwrap();

        let files = collect_artifact_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains_key("index.html"));
        assert!(files.contains_key("assets/app.js"));
    }
}
