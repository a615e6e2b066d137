//! Error types for each protocol layer.
//!
//! Errors are tagged variants, never bare strings across a component
//! boundary. Transient kinds are recovered locally with bounded retries;
//! structural kinds surface to the caller.

use crate::duration::DurationMs;
use crate::id::{AgentId, ChangeId, CommitId, SourceId};
use thiserror::Error;

/// Event source lifecycle errors.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// The platform denied access (permissions, entitlements). Not retried.
    #[error("access denied")]
    AccessDenied,

    /// A dependency the source needs is absent (binary, daemon, account).
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// The backend is temporarily unreachable. The bus may retry with
    /// backoff.
    #[error("transiently unavailable: {0}")]
    TransientUnavailable(String),

    /// The source has been stopped and will not produce further events.
    #[error("source closed")]
    Closed,
}

/// Provider (model backend) errors.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Credentials rejected. Never retried.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Provider rate-limited the request; retry after the given delay
    /// if one was supplied.
    #[error("rate limited")]
    RateLimited {
        /// Provider-suggested wait before retrying.
        retry_after: Option<DurationMs>,
    },

    /// The conversation no longer fits the model's context window.
    #[error("context length exceeded")]
    ContextLengthExceeded,

    /// The requested model does not exist at this provider.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Transport-level failure. Retried with backoff.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The provider is down or overloaded. The router may fail over.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The request was malformed. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider does not support tool calling.
    #[error("tool calling unsupported")]
    ToolsUnsupported,
}

impl ProviderError {
    /// Whether retrying the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::NetworkError(_)
        )
    }
}

/// Tool registry errors. Execution failures are not errors — they are
/// [`crate::tool::ToolOutput::Failure`] values fed back to the model.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// A tool with this name is already registered.
    #[error("duplicate tool name: {0}")]
    Duplicate(String),

    /// The requested tool was not found.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The input did not conform to the tool's declared schema.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Event bus errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    /// A source with this id is already registered.
    #[error("source already registered: {0}")]
    SourceExists(SourceId),

    /// No source with this id is registered.
    #[error("source not found: {0}")]
    SourceNotFound(SourceId),

    /// Starting the source failed (after any retries).
    #[error("source start failed: {0}")]
    Start(#[from] SourceError),

    /// The source did not finish starting within the start timeout.
    #[error("source start timed out: {0}")]
    StartTimeout(SourceId),

    /// The source's event stream was already consumed.
    #[error("event stream unavailable for source: {0}")]
    StreamUnavailable(SourceId),
}

/// Agent registry errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No identity with this id.
    #[error("agent not found: {0}")]
    NotFound(AgentId),

    /// The durable identity store failed.
    #[error("identity store: {0}")]
    Store(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Wake controller errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WakeError {
    /// The agent is not known to the registry.
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// The agent declared completion without holding a current event.
    #[error("agent has no current event: {0}")]
    NoCurrentEvent(AgentId),

    /// A registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Turn engine errors. Normal terminations (completion, truncation,
/// cancellation) are exit reasons, not errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TurnError {
    /// A provider error that survived retry/compaction handling.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Context compaction was required but could not shrink the transcript.
    #[error("context compaction failed: {0}")]
    Compaction(String),

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// How a staged change collides with one already in the staging area.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two creates of the same path.
    BothCreate,
    /// A delete staged against an edit (or vice versa).
    DeleteVsEdit,
    /// Two modifies touched the same blocks; both versions are surfaced
    /// through the review interface.
    OverlappingBlocks {
        /// The blocks both changes mutated.
        block_ids: Vec<crate::id::BlockId>,
    },
    /// Two modifies of a raw (non-document) file. Raw edits have no
    /// block granularity to merge at.
    ConcurrentRawEdit,
}

/// Staging engine errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StagingError {
    /// The submitted change collides with one already staged at this path.
    #[error("staging conflict at {path}: {kind:?}")]
    Conflict {
        /// Workspace-relative path both changes target.
        path: String,
        /// The change already staged there.
        staged: ChangeId,
        /// How they collide.
        kind: ConflictKind,
    },

    /// No staged change with this id.
    #[error("staged change not found: {0}")]
    ChangeNotFound(ChangeId),

    /// A change references a document path that does not exist.
    #[error("no such document: {0}")]
    DocumentNotFound(String),

    /// A create targets a path that already exists in the workspace.
    #[error("path already exists: {0}")]
    PathExists(String),

    /// The document envelope could not be parsed or rendered.
    #[error("envelope error: {0}")]
    Envelope(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A history operation performed during commit failed.
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// History log errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HistoryError {
    /// No commit with this id.
    #[error("unknown commit: {0}")]
    UnknownCommit(CommitId),

    /// No branch with this name.
    #[error("unknown branch: {0}")]
    UnknownBranch(String),

    /// A commit must change at least one path.
    #[error("commit changes no paths")]
    EmptyCommit,

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Approval policy errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A glob pattern failed to parse.
    #[error("bad pattern {pattern:?}: {message}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The durable policy store failed.
    #[error("policy store: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_retryability() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(ProviderError::NetworkError("reset".into()).is_retryable());
        assert!(!ProviderError::AuthenticationFailed.is_retryable());
        assert!(!ProviderError::InvalidRequest("bad".into()).is_retryable());
        assert!(!ProviderError::ContextLengthExceeded.is_retryable());
        assert!(!ProviderError::ProviderUnavailable("down".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(SourceError::AccessDenied.to_string(), "access denied");
        assert_eq!(
            ToolError::Duplicate("bash".into()).to_string(),
            "duplicate tool name: bash"
        );
        assert_eq!(
            BusError::StartTimeout(SourceId::new("cal")).to_string(),
            "source start timed out: cal"
        );
    }
}
