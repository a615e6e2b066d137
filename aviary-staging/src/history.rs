//! The append-only history log: content-addressed commits with parent
//! links and branch refs.
//!
//! ```text
//! .history/
//!   commits/<commit-id>.json   commit record (metadata + path→blob map)
//!   blobs/<sha256>             file contents at commit time
//!   refs/<branch>              head commit id
//! ```
//!
//! A commit id is the SHA-256 of the commit record's canonical JSON, so
//! records are tamper-evident and two identical commits never collide
//! with different ids. Commits to one workspace are serialized by an
//! internal lock; branches are linear chains via the first parent.

use aviary_core::{AgentId, CommitId, HistoryError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The default branch.
pub const MAIN_BRANCH: &str = "main";

/// One history commit, as exposed to callers.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Content-derived id.
    pub id: CommitId,
    /// Parent commits (one for ordinary commits, empty for the root).
    pub parent_ids: Vec<CommitId>,
    /// The agent that committed.
    pub author: AgentId,
    /// Commit message.
    pub message: String,
    /// When the commit was made.
    pub timestamp: DateTime<Utc>,
    /// Workspace-relative paths this commit touched.
    pub changed_paths: Vec<String>,
}

/// On-disk commit record. `blobs` maps each changed path to the blob
/// hash of its new content, or `None` for a deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitRecord {
    parent_ids: Vec<CommitId>,
    author: AgentId,
    message: String,
    timestamp: DateTime<Utc>,
    blobs: BTreeMap<String, Option<String>>,
}

impl CommitRecord {
    fn to_commit(&self, id: CommitId) -> Commit {
        Commit {
            id,
            parent_ids: self.parent_ids.clone(),
            author: self.author.clone(),
            message: self.message.clone(),
            timestamp: self.timestamp,
            changed_paths: self.blobs.keys().cloned().collect(),
        }
    }
}

fn io_err(e: std::io::Error) -> HistoryError {
    HistoryError::Io(e.to_string())
}

fn sha_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// The append-only commit log for one workspace.
pub struct HistoryLog {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl HistoryLog {
    /// Open (creating directories if needed) the log rooted at the
    /// workspace's `.history` directory.
    pub async fn open(root: &Path) -> Result<Self, HistoryError> {
        for sub in ["commits", "blobs", "refs"] {
            tokio::fs::create_dir_all(root.join(sub))
                .await
                .map_err(io_err)?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn ref_path(&self, branch: &str) -> PathBuf {
        self.root.join("refs").join(branch)
    }

    fn commit_path(&self, id: &CommitId) -> PathBuf {
        self.root.join("commits").join(format!("{id}.json"))
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join("blobs").join(hash)
    }

    /// Head of a branch. `None` for an empty main; unknown branches are
    /// errors.
    pub async fn head(&self, branch: &str) -> Result<Option<CommitId>, HistoryError> {
        match tokio::fs::read_to_string(self.ref_path(branch)).await {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(CommitId::new(trimmed)))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if branch == MAIN_BRANCH {
                    Ok(None)
                } else {
                    Err(HistoryError::UnknownBranch(branch.to_string()))
                }
            }
            Err(e) => Err(io_err(e)),
        }
    }

    /// Append one commit to a branch. `changes` maps each path to its
    /// new content (`None` = deleted). The head advances atomically
    /// under the log's write lock; a commit lands entirely or not at all.
    pub async fn append(
        &self,
        branch: &str,
        author: AgentId,
        message: impl Into<String>,
        changes: BTreeMap<String, Option<String>>,
    ) -> Result<Commit, HistoryError> {
        if changes.is_empty() {
            return Err(HistoryError::EmptyCommit);
        }

        let _guard = self.write_lock.lock().await;
        let parent = self.head(branch).await?;

        let mut blobs = BTreeMap::new();
        for (path, content) in changes {
            match content {
                Some(content) => {
                    let hash = sha_hex(content.as_bytes());
                    let blob_path = self.blob_path(&hash);
                    if !tokio::fs::try_exists(&blob_path).await.map_err(io_err)? {
                        tokio::fs::write(&blob_path, content).await.map_err(io_err)?;
                    }
                    blobs.insert(path, Some(hash));
                }
                None => {
                    blobs.insert(path, None);
                }
            }
        }

        let record = CommitRecord {
            parent_ids: parent.into_iter().collect(),
            author,
            message: message.into(),
            timestamp: Utc::now(),
            blobs,
        };
        let canonical =
            serde_json::to_string(&record).map_err(|e| HistoryError::Serialization(e.to_string()))?;
        let id = CommitId::new(sha_hex(canonical.as_bytes()));

        tokio::fs::write(self.commit_path(&id), canonical)
            .await
            .map_err(io_err)?;
        tokio::fs::write(self.ref_path(branch), id.as_str())
            .await
            .map_err(io_err)?;

        tracing::debug!(commit = %id, branch, "commit appended");
        Ok(record.to_commit(id))
    }

    async fn record(&self, id: &CommitId) -> Result<CommitRecord, HistoryError> {
        match tokio::fs::read_to_string(self.commit_path(id)).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| HistoryError::Serialization(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HistoryError::UnknownCommit(id.clone()))
            }
            Err(e) => Err(io_err(e)),
        }
    }

    /// Load one commit.
    pub async fn commit(&self, id: &CommitId) -> Result<Commit, HistoryError> {
        Ok(self.record(id).await?.to_commit(id.clone()))
    }

    /// Walk a branch newest-first, optionally filtered to commits
    /// touching `path`, up to `limit` entries.
    pub async fn history(
        &self,
        branch: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Commit>, HistoryError> {
        let mut commits = Vec::new();
        let mut cursor = self.head(branch).await?;
        while let Some(id) = cursor {
            if commits.len() >= limit {
                break;
            }
            let record = self.record(&id).await?;
            let matches = path.is_none_or(|p| record.blobs.contains_key(p));
            cursor = record.parent_ids.first().cloned();
            if matches {
                commits.push(record.to_commit(id));
            }
        }
        Ok(commits)
    }

    /// Content of `path` as of `commit` (walking back to the commit that
    /// last touched it). `None` if the path did not exist there.
    pub async fn content_at(
        &self,
        commit: &CommitId,
        path: &str,
    ) -> Result<Option<String>, HistoryError> {
        let mut cursor = Some(commit.clone());
        while let Some(id) = cursor {
            let record = self.record(&id).await?;
            if let Some(blob) = record.blobs.get(path) {
                return match blob {
                    Some(hash) => {
                        let contents = tokio::fs::read_to_string(self.blob_path(hash))
                            .await
                            .map_err(io_err)?;
                        Ok(Some(contents))
                    }
                    None => Ok(None),
                };
            }
            cursor = record.parent_ids.first().cloned();
        }
        Ok(None)
    }

    /// Paths changed between an ancestor `a` and a descendant `b`
    /// (commits after `a`, up to and including `b`). Errors if `a` is
    /// not in `b`'s ancestry.
    pub async fn diff(&self, a: &CommitId, b: &CommitId) -> Result<Vec<String>, HistoryError> {
        if a == b {
            return Ok(Vec::new());
        }
        let mut changed = std::collections::BTreeSet::new();
        let mut cursor = Some(b.clone());
        while let Some(id) = cursor {
            if id == *a {
                return Ok(changed.into_iter().collect());
            }
            let record = self.record(&id).await?;
            changed.extend(record.blobs.keys().cloned());
            cursor = record.parent_ids.first().cloned();
        }
        Err(HistoryError::UnknownCommit(a.clone()))
    }

    /// Create a branch ref pointing at an existing commit.
    pub async fn create_branch(&self, name: &str, from: &CommitId) -> Result<(), HistoryError> {
        // Verify the commit exists before publishing a ref to it.
        self.record(from).await?;
        tokio::fs::write(self.ref_path(name), from.as_str())
            .await
            .map_err(io_err)
    }
}
