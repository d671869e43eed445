//! Workspace model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named, filesystem-isolated project directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    /// Unique name; may contain one `/` for a session/variant hierarchy
    pub name: String,
    /// Resolved absolute path under the store root
    pub path: PathBuf,
    pub last_modified_at: DateTime<Utc>,
    pub has_version_control: bool,
    pub has_dependency_manifest: bool,
    pub has_container_descriptor: bool,
}

/// One entry in a workspace's commit history
///
/// The full ordered sequence is derived from the commit log on demand
/// and never cached; concurrent sessions may add commits between
/// queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVersion {
    /// Commit identifier
    pub id: String,
    /// 1-based sequence number, oldest first
    pub version: usize,
    /// Commit subject, when one was given
    pub instruction: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single file mutation, addressed by a relative path within a workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilePatch {
    /// Replace every occurrence of `find` with `with`
    Replace {
        path: String,
        find: String,
        with: String,
    },
    /// Write (create or overwrite) the file with `content`
    Write { path: String, content: String },
    /// Delete the file
    Delete { path: String },
}

impl FilePatch {
    /// The relative path this patch addresses
    pub fn path(&self) -> &str {
        match self {
            Self::Replace { path, .. } => path,
            Self::Write { path, .. } => path,
            Self::Delete { path } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workspace_info_serializes_in_camel_case() {
        let info = WorkspaceInfo {
            name: "demo".to_string(),
            path: PathBuf::from("/tmp/demo"),
            last_modified_at: Utc::now(),
            has_version_control: true,
            has_dependency_manifest: false,
            has_container_descriptor: false,
        };

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["hasVersionControl"], json!(true));
        assert!(value.get("has_version_control").is_none());
        assert!(value.get("lastModifiedAt").is_some());
    }

    #[test]
    fn test_file_patch_tagged_representation() {
        let patch = FilePatch::Replace {
            path: "index.html".to_string(),
            find: "old".to_string(),
            with: "new".to_string(),
        };

        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value["op"], json!("replace"));
        assert_eq!(patch.path(), "index.html");
    }
}
