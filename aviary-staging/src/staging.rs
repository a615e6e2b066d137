//! The staging engine: every agent mutation lands here first, and reaches
//! the working tree only through an atomic commit.

use crate::document::Document;
use crate::envelope;
use crate::history::{Commit, HistoryLog, MAIN_BRANCH};
use crate::workspace::Workspace;
use aviary_core::{
    AgentId, BlockId, ChangeId, CommitId, ConflictKind, StagingError, WorkspaceId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// What kind of mutation a staged change is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// New path.
    Create,
    /// Existing path, new content.
    Modify,
    /// Remove the path.
    Delete,
}

/// The staged content.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangePayload {
    /// A full document (for create/modify of `.md` envelopes).
    Document {
        /// The new document state.
        document: Document,
    },
    /// Raw file contents.
    Raw {
        /// The new contents.
        contents: String,
    },
    /// No content; the path is being removed.
    Delete,
}

/// A pending, discardable, workspace-scoped mutation keyed by
/// (agent, change-id). Readable only by the submitting agent and the
/// review interface.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedChange {
    /// Stable change id.
    pub id: ChangeId,
    /// The submitting agent.
    pub agent_id: AgentId,
    /// The workspace this change belongs to.
    pub workspace_id: WorkspaceId,
    /// Workspace-relative target path.
    pub path: String,
    /// Mutation kind.
    pub change_type: ChangeType,
    /// Staged content.
    pub payload: ChangePayload,
    /// When it was staged.
    pub staged_at: DateTime<Utc>,
    /// One-line human summary for the review interface.
    pub preview: String,
}

/// The staging and commit engine for one workspace. Exclusive owner of
/// the staging area; the only writer of the working tree.
pub struct StagingEngine {
    workspace: Workspace,
    history: HistoryLog,
}

fn io_err(e: std::io::Error) -> StagingError {
    StagingError::Io(e.to_string())
}

impl StagingEngine {
    /// Initialize a new workspace and its engine.
    pub async fn init(
        root: &Path,
        meta: crate::workspace::WorkspaceMeta,
    ) -> Result<Self, StagingError> {
        let workspace = Workspace::init(root, meta).await?;
        let history = HistoryLog::open(&workspace.history_dir()).await?;
        Ok(Self { workspace, history })
    }

    /// Open an existing workspace.
    pub async fn open(root: &Path) -> Result<Self, StagingError> {
        let workspace = Workspace::open(root).await?;
        let history = HistoryLog::open(&workspace.history_dir()).await?;
        Ok(Self { workspace, history })
    }

    /// The underlying workspace (reads only).
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// The history log.
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Submit a change to the staging area. The working tree is not
    /// touched; conflicts with already-staged changes reject the
    /// submission and leave the earlier change in place.
    pub async fn stage(
        &self,
        agent: &AgentId,
        path: &str,
        change_type: ChangeType,
        payload: ChangePayload,
    ) -> Result<StagedChange, StagingError> {
        match (change_type, &payload) {
            (ChangeType::Delete, ChangePayload::Delete) => {}
            (ChangeType::Delete, _) | (_, ChangePayload::Delete) => {
                return Err(StagingError::Serialization(
                    "change type and payload disagree".into(),
                ));
            }
            _ => {}
        }

        let exists = self.workspace.exists(path).await;
        match change_type {
            ChangeType::Create if exists => {
                return Err(StagingError::PathExists(path.to_string()));
            }
            ChangeType::Modify | ChangeType::Delete if !exists => {
                return Err(StagingError::DocumentNotFound(path.to_string()));
            }
            _ => {}
        }

        for existing in self.all_staged().await? {
            if existing.path != path {
                continue;
            }
            if let Some(kind) = self.conflict_between(&existing, change_type, &payload).await? {
                return Err(StagingError::Conflict {
                    path: path.to_string(),
                    staged: existing.id,
                    kind,
                });
            }
        }

        let change = StagedChange {
            id: ChangeId::fresh(),
            agent_id: agent.clone(),
            workspace_id: self.workspace.meta().id.clone(),
            path: path.to_string(),
            change_type,
            payload,
            staged_at: Utc::now(),
            preview: String::new(),
        };
        let change = StagedChange {
            preview: preview_of(&change),
            ..change
        };

        let dir = self.workspace.staging_dir(agent);
        tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;
        let contents = serde_json::to_string_pretty(&change)
            .map_err(|e| StagingError::Serialization(e.to_string()))?;
        tokio::fs::write(dir.join(format!("{}.json", change.id)), contents)
            .await
            .map_err(io_err)?;

        debug!(agent = %agent, path, ?change_type, change = %change.id, "change staged");
        Ok(change)
    }

    async fn conflict_between(
        &self,
        existing: &StagedChange,
        new_type: ChangeType,
        new_payload: &ChangePayload,
    ) -> Result<Option<ConflictKind>, StagingError> {
        match (existing.change_type, new_type) {
            (ChangeType::Create, ChangeType::Create) => Ok(Some(ConflictKind::BothCreate)),
            (ChangeType::Delete, ChangeType::Delete) => Ok(None),
            (ChangeType::Delete, _) | (_, ChangeType::Delete) => {
                Ok(Some(ConflictKind::DeleteVsEdit))
            }
            (ChangeType::Modify, ChangeType::Modify) => {
                let (ChangePayload::Document { document: theirs },
                     ChangePayload::Document { document: ours }) =
                    (&existing.payload, new_payload)
                else {
                    return Ok(Some(ConflictKind::ConcurrentRawEdit));
                };
                let base = self
                    .workspace
                    .read_document(&existing.path)
                    .await?
                    .ok_or_else(|| StagingError::DocumentNotFound(existing.path.clone()))?;
                let overlap: Vec<BlockId> = changed_blocks(&base, theirs)
                    .intersection(&changed_blocks(&base, ours))
                    .cloned()
                    .collect();
                if overlap.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(ConflictKind::OverlappingBlocks { block_ids: overlap }))
                }
            }
            // Create+Modify pairs are unreachable: a staged create means
            // the path is absent from the tree, so a modify fails the
            // existence check (and vice versa).
            _ => Ok(None),
        }
    }

    /// The staged changes owned by one agent.
    pub async fn staged_for(&self, agent: &AgentId) -> Result<Vec<StagedChange>, StagingError> {
        self.read_staged_dir(&self.workspace.staging_dir(agent))
            .await
    }

    /// Every staged change, across agents. This is the review interface;
    /// agents read only their own via [`StagingEngine::staged_for`].
    pub async fn review_all(&self) -> Result<Vec<StagedChange>, StagingError> {
        self.all_staged().await
    }

    /// The document an agent sees at a path: its own staged version if it
    /// has one, else the committed state. Reads observe the agent's own
    /// writes immediately.
    pub async fn staged_document(
        &self,
        agent: &AgentId,
        path: &str,
    ) -> Result<Option<Document>, StagingError> {
        for change in self.staged_for(agent).await? {
            if change.path == path {
                return match change.payload {
                    ChangePayload::Document { document } => Ok(Some(document)),
                    ChangePayload::Delete | ChangePayload::Raw { .. } => Ok(None),
                };
            }
        }
        self.workspace.read_document(path).await
    }

    /// Discard everything an agent has staged. The cancellation path for
    /// a turn: partially staged changes go away, the workspace does not
    /// move.
    pub async fn discard_all_for(&self, agent: &AgentId) -> Result<usize, StagingError> {
        let ids: Vec<ChangeId> = self
            .staged_for(agent)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let count = ids.len();
        self.discard(&ids).await?;
        Ok(count)
    }

    /// Remove staged changes with no effect on the workspace.
    pub async fn discard(&self, ids: &[ChangeId]) -> Result<(), StagingError> {
        for id in ids {
            let change = self.find_change(id).await?;
            let path = self
                .workspace
                .staging_dir(&change.agent_id)
                .join(format!("{id}.json"));
            tokio::fs::remove_file(path).await.map_err(io_err)?;
            debug!(change = %id, "staged change discarded");
        }
        Ok(())
    }

    /// Apply staged changes to the workspace and record one commit.
    /// Validates that every id exists and that the set is internally
    /// consistent; the commit lands entirely or not at all.
    pub async fn commit(
        &self,
        ids: &[ChangeId],
        message: impl Into<String>,
        author: AgentId,
    ) -> Result<Commit, StagingError> {
        let mut changes = Vec::with_capacity(ids.len());
        for id in ids {
            changes.push(self.find_change(id).await?);
        }

        // Group by path and resolve each group to one new content state.
        let mut by_path: BTreeMap<String, Vec<&StagedChange>> = BTreeMap::new();
        for change in &changes {
            by_path.entry(change.path.clone()).or_default().push(change);
        }

        let mut new_contents: BTreeMap<String, Option<String>> = BTreeMap::new();
        for (path, group) in &by_path {
            let content = self.resolve_group(path, group).await?;
            new_contents.insert(path.clone(), content);
        }

        // All content computed: apply to the tree, then append history.
        for (path, content) in &new_contents {
            match content {
                Some(content) => self.workspace.write_raw(path, content).await?,
                None => self.workspace.remove(path).await?,
            }
        }

        let commit = self
            .history
            .append(MAIN_BRANCH, author, message, new_contents)
            .await?;

        for change in &changes {
            let staged_path = self
                .workspace
                .staging_dir(&change.agent_id)
                .join(format!("{}.json", change.id));
            tokio::fs::remove_file(staged_path).await.map_err(io_err)?;
        }

        info!(commit = %commit.id, changes = changes.len(), "staged changes committed");
        Ok(commit)
    }

    /// Bring a path back to its state at an earlier commit, as a new
    /// commit on head — history is never rewritten.
    pub async fn restore(
        &self,
        path: &str,
        commit: &CommitId,
        author: AgentId,
    ) -> Result<Commit, StagingError> {
        let content = self.history.content_at(commit, path).await?;
        match &content {
            Some(content) => self.workspace.write_raw(path, content).await?,
            None => self.workspace.remove(path).await?,
        }
        let commit = self
            .history
            .append(
                MAIN_BRANCH,
                author,
                format!("restore {path} to {commit}"),
                BTreeMap::from([(path.to_string(), content)]),
            )
            .await?;
        Ok(commit)
    }

    async fn resolve_group(
        &self,
        path: &str,
        group: &[&StagedChange],
    ) -> Result<Option<String>, StagingError> {
        if group.len() == 1 {
            return payload_content(&group[0].payload);
        }

        // Multiple changes to one path commit together only when they are
        // all deletes, or all block-disjoint document modifies.
        if group.iter().all(|c| c.change_type == ChangeType::Delete) {
            return Ok(None);
        }

        let mut documents = Vec::with_capacity(group.len());
        for change in group {
            match (&change.change_type, &change.payload) {
                (ChangeType::Modify, ChangePayload::Document { document }) => {
                    documents.push(document)
                }
                _ => {
                    return Err(StagingError::Conflict {
                        path: path.to_string(),
                        staged: group[0].id.clone(),
                        kind: ConflictKind::DeleteVsEdit,
                    });
                }
            }
        }

        let base = self
            .workspace
            .read_document(path)
            .await?
            .ok_or_else(|| StagingError::DocumentNotFound(path.to_string()))?;

        // Pairwise disjointness over the whole set.
        let sets: Vec<BTreeSet<BlockId>> =
            documents.iter().map(|d| changed_blocks(&base, d)).collect();
        for (i, a) in sets.iter().enumerate() {
            for b in sets.iter().skip(i + 1) {
                let overlap: Vec<BlockId> = a.intersection(b).cloned().collect();
                if !overlap.is_empty() {
                    return Err(StagingError::Conflict {
                        path: path.to_string(),
                        staged: group[0].id.clone(),
                        kind: ConflictKind::OverlappingBlocks { block_ids: overlap },
                    });
                }
            }
        }

        let merged = merge_documents(&base, &documents);
        Ok(Some(envelope::render(&merged)?))
    }

    async fn find_change(&self, id: &ChangeId) -> Result<StagedChange, StagingError> {
        self.all_staged()
            .await?
            .into_iter()
            .find(|c| c.id == *id)
            .ok_or_else(|| StagingError::ChangeNotFound(id.clone()))
    }

    async fn all_staged(&self) -> Result<Vec<StagedChange>, StagingError> {
        let root = self.workspace.staging_root();
        let mut agents = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut changes = Vec::new();
        while let Some(agent_dir) = agents.next_entry().await.map_err(io_err)? {
            changes.extend(self.read_staged_dir(&agent_dir.path()).await?);
        }
        changes.sort_by(|a, b| a.staged_at.cmp(&b.staged_at));
        Ok(changes)
    }

    async fn read_staged_dir(&self, dir: &Path) -> Result<Vec<StagedChange>, StagingError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut changes = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(io_err)?;
            let change: StagedChange = serde_json::from_str(&contents)
                .map_err(|e| StagingError::Serialization(e.to_string()))?;
            changes.push(change);
        }
        changes.sort_by(|a, b| a.staged_at.cmp(&b.staged_at));
        Ok(changes)
    }
}

fn payload_content(payload: &ChangePayload) -> Result<Option<String>, StagingError> {
    match payload {
        ChangePayload::Document { document } => Ok(Some(envelope::render(document)?)),
        ChangePayload::Raw { contents } => Ok(Some(contents.clone())),
        ChangePayload::Delete => Ok(None),
    }
}

fn preview_of(change: &StagedChange) -> String {
    match (&change.change_type, &change.payload) {
        (ChangeType::Delete, _) => format!("delete {}", change.path),
        (kind, ChangePayload::Document { document }) => format!(
            "{} {} ({} blocks, {:?})",
            verb(kind),
            change.path,
            document.blocks.len(),
            document.title,
        ),
        (kind, ChangePayload::Raw { contents }) => {
            format!("{} {} ({} bytes)", verb(kind), change.path, contents.len())
        }
        (kind, _) => format!("{} {}", verb(kind), change.path),
    }
}

fn verb(kind: &ChangeType) -> &'static str {
    match kind {
        ChangeType::Create => "create",
        ChangeType::Modify => "modify",
        ChangeType::Delete => "delete",
    }
}

/// The block ids a new version touches relative to a base: added,
/// modified, or removed blocks.
fn changed_blocks(base: &Document, new: &Document) -> BTreeSet<BlockId> {
    let mut changed = BTreeSet::new();
    for block in &new.blocks {
        match base.block(&block.id) {
            Some(base_block) if base_block == block => {}
            _ => {
                changed.insert(block.id.clone());
            }
        }
    }
    let new_ids: BTreeSet<&BlockId> = new.blocks.iter().map(|b| &b.id).collect();
    for block in &base.blocks {
        if !new_ids.contains(&block.id) {
            changed.insert(block.id.clone());
        }
    }
    changed
}

/// Merge block-disjoint document versions over a base: each version's
/// changed blocks replace the base's in place, removals apply, and new
/// blocks append in version order.
fn merge_documents(base: &Document, versions: &[&Document]) -> Document {
    let mut merged = base.clone();
    for version in versions {
        let changed = changed_blocks(base, version);
        let version_ids: BTreeSet<&BlockId> = version.blocks.iter().map(|b| &b.id).collect();

        // Removals.
        merged
            .blocks
            .retain(|b| version_ids.contains(&b.id) || !changed.contains(&b.id));

        // In-place replacements and appends.
        for block in &version.blocks {
            if !changed.contains(&block.id) {
                continue;
            }
            match merged.blocks.iter_mut().find(|b| b.id == block.id) {
                Some(slot) => *slot = block.clone(),
                None => merged.blocks.push(block.clone()),
            }
        }

        if version.title != base.title {
            merged.title = version.title.clone();
        }
        if version.tags != base.tags {
            merged.tags = version.tags.clone();
        }
    }
    merged.updated_at = Utc::now();
    merged
}
