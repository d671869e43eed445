//! Workspace directory management under a single root
//!
//! Layout:
//! ```text
//! {root}/
//!   my-project/            # top-level workspace
//!   session-ab12cd34/      # ephemeral session directory
//!     v1/                  # variant workspace ("session-ab12cd34/v1")
//!     v2/
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, WorkspaceError};
use crate::model::{FilePatch, WorkspaceInfo};

/// Files that mark a directory as a real project workspace
const MANIFEST_FILES: &[&str] = &["package.json", "Cargo.toml", "pyproject.toml"];
const ENTRY_FILES: &[&str] = &["index.html", "index.htm"];
const CONTAINER_FILES: &[&str] = &["Dockerfile", "docker-compose.yml"];

/// Configuration for WorkspaceStore
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name prefix marking ephemeral session workspaces
    pub ephemeral_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ephemeral_prefix: "session-".to_string(),
        }
    }
}

/// Owns a root directory of named project workspaces
///
/// All file traffic into a workspace goes through this type; no other
/// component writes into the root.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
    config: StoreConfig,
}

impl WorkspaceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(root: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The prefix marking ephemeral session workspaces
    pub fn ephemeral_prefix(&self) -> &str {
        &self.config.ephemeral_prefix
    }

    /// Resolve a workspace name to its on-disk path
    ///
    /// Pure path math, no I/O: the same name always yields the same
    /// path. Names may contain one `/` separating a session directory
    /// from a variant directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let segments: Vec<&str> = name.split('/').collect();

        if segments.is_empty() || segments.len() > 2 {
            return Err(WorkspaceError::InvalidName {
                name: name.to_string(),
            });
        }

        for segment in &segments {
            if segment.is_empty()
                || *segment == "."
                || *segment == ".."
                || segment.contains('\\')
                || segment.contains(':')
            {
                return Err(WorkspaceError::InvalidName {
                    name: name.to_string(),
                });
            }
        }

        let mut path = self.root.clone();
        for segment in segments {
            path.push(segment);
        }
        Ok(path)
    }

    /// Check whether a workspace directory exists
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    /// Create a workspace directory (idempotent), returning its path
    pub async fn create(&self, name: &str) -> Result<PathBuf> {
        let path = self.resolve(name)?;
        tokio::fs::create_dir_all(&path).await?;
        debug!("Created workspace {:?}", path);
        Ok(path)
    }

    /// Remove a workspace directory and everything beneath it
    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(WorkspaceError::not_found(name));
        }
        tokio::fs::remove_dir_all(&path).await?;
        info!("Removed workspace {:?}", path);
        Ok(())
    }

    /// Read a file from a workspace
    pub async fn read_file(&self, name: &str, relative_path: &str) -> Result<String> {
        let path = self.file_path(name, relative_path)?;
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WorkspaceError::not_found(format!("{}/{}", name, relative_path))
            } else {
                WorkspaceError::Io(e)
            }
        })
    }

    /// Write a file into a workspace, creating parent directories
    pub async fn write_file(&self, name: &str, relative_path: &str, content: &str) -> Result<()> {
        let path = self.file_path(name, relative_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    /// Delete a file from a workspace
    pub async fn delete_file(&self, name: &str, relative_path: &str) -> Result<()> {
        let path = self.file_path(name, relative_path)?;
        tokio::fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WorkspaceError::not_found(format!("{}/{}", name, relative_path))
            } else {
                WorkspaceError::Io(e)
            }
        })
    }

    /// Apply one file patch to a workspace
    pub async fn apply_patch(&self, name: &str, patch: &FilePatch) -> Result<()> {
        match patch {
            FilePatch::Replace { path, find, with } => {
                let content = self.read_file(name, path).await?;
                let replaced = content.replace(find.as_str(), with);
                if replaced == content {
                    warn!("Patch for {}/{} matched nothing", name, path);
                }
                self.write_file(name, path, &replaced).await
            }
            FilePatch::Write { path, content } => self.write_file(name, path, content).await,
            FilePatch::Delete { path } => self.delete_file(name, path).await,
        }
    }

    /// Apply a batch of patches, returning how many were applied
    pub async fn apply_patches(&self, name: &str, patches: &[FilePatch]) -> Result<usize> {
        for patch in patches {
            self.apply_patch(name, patch).await?;
        }
        Ok(patches.len())
    }

    /// Enumerate workspaces under the root
    ///
    /// Immediate children plus, for ephemeral session directories, one
    /// level of variant grandchildren; entries that do not look like
    /// real project directories are filtered out.
    pub async fn list(&self) -> Result<Vec<WorkspaceInfo>> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut workspaces = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let Some(child_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned)
            else {
                continue;
            };

            if child_name.starts_with(&self.config.ephemeral_prefix) {
                // Session directory: its variant subdirectories are
                // the actual workspaces.
                let mut variants = match tokio::fs::read_dir(&path).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Failed to read session directory {:?}: {}", path, e);
                        continue;
                    }
                };
                while let Some(variant) = variants.next_entry().await? {
                    let variant_path = variant.path();
                    if !variant_path.is_dir() || !looks_like_project(&variant_path) {
                        continue;
                    }
                    let Some(variant_name) = variant_path.file_name().and_then(|n| n.to_str())
                    else {
                        continue;
                    };
                    workspaces.push(describe(
                        format!("{}/{}", child_name, variant_name),
                        variant_path,
                    ));
                }
            } else if looks_like_project(&path) {
                workspaces.push(describe(child_name, path));
            }
        }

        workspaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workspaces)
    }

    /// Remove abandoned ephemeral session directories
    ///
    /// A session directory is swept only when its name carries the
    /// ephemeral prefix, its modification time is older than
    /// `older_than`, none of its paths appear in `exclude` (workspaces
    /// bound to a live session), and it holds no meaningful files. The
    /// meaningful-file check is conservative: any non-hidden file
    /// anywhere keeps the directory.
    ///
    /// A failure on one directory logs and continues the sweep.
    pub async fn cleanup_stale(&self, older_than: Duration, exclude: &[PathBuf]) -> Result<usize> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(0);
        }

        let cutoff = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&self.config.ephemeral_prefix) {
                continue;
            }

            if exclude.iter().any(|p| p.starts_with(&path)) {
                debug!("Skipping {:?}: bound to a live session", path);
                continue;
            }

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Failed to stat {:?}: {}", path, e);
                    continue;
                }
            };
            if modified > cutoff {
                continue;
            }

            if has_meaningful_files(&path) {
                debug!("Skipping {:?}: still holds content", path);
                continue;
            }

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    info!("Swept stale workspace {:?}", path);
                    removed += 1;
                }
                Err(e) => {
                    warn!("Failed to sweep {:?}: {}", path, e);
                }
            }
        }

        Ok(removed)
    }

    fn file_path(&self, name: &str, relative_path: &str) -> Result<PathBuf> {
        let base = self.resolve(name)?;
        let rel = Path::new(relative_path);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(WorkspaceError::InvalidName {
                name: relative_path.to_string(),
            });
        }
        Ok(base.join(rel))
    }
}

fn describe(name: String, path: PathBuf) -> WorkspaceInfo {
    let last_modified_at = std::fs::metadata(&path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    WorkspaceInfo {
        has_version_control: path.join(".git").is_dir(),
        has_dependency_manifest: MANIFEST_FILES.iter().any(|f| path.join(f).is_file()),
        has_container_descriptor: CONTAINER_FILES.iter().any(|f| path.join(f).is_file()),
        name,
        path,
        last_modified_at,
    }
}

/// Whether a directory looks like a real project workspace
fn looks_like_project(path: &Path) -> bool {
    MANIFEST_FILES
        .iter()
        .chain(ENTRY_FILES)
        .any(|f| path.join(f).is_file())
        || path.join(".git").is_dir()
}

/// Whether a directory holds any non-hidden file, at any depth
fn has_meaningful_files(dir: &Path) -> bool {
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
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
            } else {
                return true;
            }
        }
    }

    false
}
