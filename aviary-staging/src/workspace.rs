//! Workspace metadata and on-disk layout.
//!
//! ```text
//! <root>/
//!   .meta/workspace.yaml     name, description, owner, version
//!   .history/                commit log (see history module)
//!   .staging/<agent>/<id>.json   pending changes
//!   <path>.md                one envelope file per document
//! ```

use crate::document::Document;
use crate::envelope;
use aviary_core::{AgentId, StagingError, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What a contributor may do in a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorRole {
    /// Read documents only.
    Reader,
    /// Stage changes.
    Editor,
}

/// Persistent workspace metadata, stored at `.meta/workspace.yaml`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMeta {
    /// Stable id.
    pub id: WorkspaceId,
    /// Display name.
    pub name: String,
    /// What the workspace is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owning user.
    pub owner: String,
    /// Layout version.
    pub version: u32,
    /// Agents allowed in, and what they may do.
    #[serde(default)]
    pub contributors: BTreeMap<AgentId, ContributorRole>,
    /// Optional remote a sync layer would attach to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

impl WorkspaceMeta {
    /// Fresh metadata for a new workspace.
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: WorkspaceId::fresh(),
            name: name.into(),
            description: None,
            owner: owner.into(),
            version: 1,
            contributors: BTreeMap::new(),
            remote: None,
        }
    }

    /// Grant a contributor a role.
    pub fn with_contributor(mut self, agent: AgentId, role: ContributorRole) -> Self {
        self.contributors.insert(agent, role);
        self
    }
}

/// An opened workspace directory.
pub struct Workspace {
    root: PathBuf,
    meta: WorkspaceMeta,
}

fn io_err(e: std::io::Error) -> StagingError {
    StagingError::Io(e.to_string())
}

impl Workspace {
    /// Initialize a new workspace directory.
    pub async fn init(root: &Path, meta: WorkspaceMeta) -> Result<Self, StagingError> {
        tokio::fs::create_dir_all(root.join(".meta"))
            .await
            .map_err(io_err)?;
        tokio::fs::create_dir_all(root.join(".staging"))
            .await
            .map_err(io_err)?;
        let yaml = serde_yml::to_string(&meta)
            .map_err(|e| StagingError::Serialization(e.to_string()))?;
        tokio::fs::write(root.join(".meta/workspace.yaml"), yaml)
            .await
            .map_err(io_err)?;
        Ok(Self {
            root: root.to_path_buf(),
            meta,
        })
    }

    /// Open an existing workspace directory.
    pub async fn open(root: &Path) -> Result<Self, StagingError> {
        let yaml = tokio::fs::read_to_string(root.join(".meta/workspace.yaml"))
            .await
            .map_err(io_err)?;
        let meta: WorkspaceMeta =
            serde_yml::from_str(&yaml).map_err(|e| StagingError::Serialization(e.to_string()))?;
        Ok(Self {
            root: root.to_path_buf(),
            meta,
        })
    }

    /// The workspace metadata.
    pub fn meta(&self) -> &WorkspaceMeta {
        &self.meta
    }

    /// The workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The history log directory.
    pub fn history_dir(&self) -> PathBuf {
        self.root.join(".history")
    }

    /// The staging directory for one agent.
    pub fn staging_dir(&self, agent: &AgentId) -> PathBuf {
        self.root.join(".staging").join(agent.as_str())
    }

    /// The staging root holding every agent's pending changes.
    pub fn staging_root(&self) -> PathBuf {
        self.root.join(".staging")
    }

    /// Absolute path of a workspace-relative document path.
    pub fn file_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Whether a workspace-relative path exists in the working tree.
    pub async fn exists(&self, rel: &str) -> bool {
        tokio::fs::try_exists(self.file_path(rel))
            .await
            .unwrap_or(false)
    }

    /// Read raw file contents. `None` if absent.
    pub async fn read_raw(&self, rel: &str) -> Result<Option<String>, StagingError> {
        match tokio::fs::read_to_string(self.file_path(rel)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    /// Read and parse a document envelope. `None` if absent.
    pub async fn read_document(&self, rel: &str) -> Result<Option<Document>, StagingError> {
        match self.read_raw(rel).await? {
            Some(contents) => Ok(Some(envelope::parse(&contents)?)),
            None => Ok(None),
        }
    }

    /// Write raw contents. Only the staging engine calls this — agents
    /// never touch the working tree directly.
    pub(crate) async fn write_raw(&self, rel: &str, contents: &str) -> Result<(), StagingError> {
        let path = self.file_path(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, contents).await.map_err(io_err)
    }

    /// Remove a file from the working tree. Only the staging engine
    /// calls this.
    pub(crate) async fn remove(&self, rel: &str) -> Result<(), StagingError> {
        match tokio::fs::remove_file(self.file_path(rel)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_then_open_roundtrips_meta() {
        let dir = tempfile::tempdir().unwrap();
        let meta = WorkspaceMeta::new("research", "sam")
            .with_contributor(AgentId::new("scout"), ContributorRole::Editor);
        let ws = Workspace::init(dir.path(), meta.clone()).await.unwrap();
        assert_eq!(ws.meta().name, "research");

        let reopened = Workspace::open(dir.path()).await.unwrap();
        assert_eq!(reopened.meta(), &meta);
        assert!(dir.path().join(".meta/workspace.yaml").exists());
    }

    #[tokio::test]
    async fn raw_read_write_remove() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::init(dir.path(), WorkspaceMeta::new("w", "o"))
            .await
            .unwrap();

        assert!(ws.read_raw("notes/a.md").await.unwrap().is_none());
        ws.write_raw("notes/a.md", "hello").await.unwrap();
        assert_eq!(ws.read_raw("notes/a.md").await.unwrap().unwrap(), "hello");
        assert!(ws.exists("notes/a.md").await);

        ws.remove("notes/a.md").await.unwrap();
        assert!(!ws.exists("notes/a.md").await);
        ws.remove("notes/a.md").await.unwrap();
    }
}
