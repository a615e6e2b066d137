//! # aviary-core — protocol traits for the aviary multi-agent runtime
//!
//! This crate defines the boundaries between the runtime's services and the
//! types that cross them. Everything else in the workspace implements or
//! consumes what is declared here.
//!
//! ## The Protocols
//!
//! | Boundary | Trait | What it does |
//! |----------|-------|-------------|
//! | Event production | [`EventSource`] | A lazy, single-consumer stream of trigger events |
//! | Model backend | [`Provider`] | One completion request → one lazy event stream |
//! | Capability | [`Tool`] | A named, schema-validated, risk-classified action |
//! | Wake delivery | [`WakeSink`] | Where the bus hands matched events |
//! | Human gate | [`ApprovalPrompter`] | Where approval requests go to be decided |
//!
//! ## Design Principle
//!
//! Services own their state and reference everything else by opaque id.
//! An agent never holds a workspace or another agent by value — it holds a
//! [`WorkspaceId`] or [`AgentId`] and asks the owning service. Payloads,
//! provider events, and tool outputs are closed tagged enums; consumers
//! handle every known variant and ignore unknown future ones.
//!
//! ## Dependency Notes
//!
//! `serde_json::Value` is used for extension data (event metadata payloads,
//! tool inputs). JSON is the interchange format of the surrounding
//! ecosystem; a generic `T: Serialize` would cost trait-object safety for
//! no practical gain.

#![deny(missing_docs)]

pub mod agent;
pub mod approval;
pub mod config;
pub mod duration;
pub mod error;
pub mod event;
pub mod id;
pub mod provider;
pub mod source;
pub mod tool;
pub mod value;
pub mod wake;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use agent::{AgentIdentity, AgentProfile, AgentStatus};
pub use approval::{
    AdmitMode, ApprovalPrompter, ApprovalRequest, ApprovalResponse, Decision, InteractionOutcome,
    RejectReason,
};
pub use config::{RuntimeConfig, Sensitivity};
pub use duration::DurationMs;
pub use error::{
    BusError, ConflictKind, HistoryError, PolicyError, ProviderError, RegistryError, SourceError,
    StagingError, ToolError, TurnError, WakeError,
};
pub use event::{EventFilter, EventPayload, EventType, FileChangeKind, Subscription, TriggerEvent};
pub use id::{
    AgentId, BlockId, ChangeId, CommitId, DocumentId, EventId, SourceId, ToolCallId, WorkspaceId,
};
pub use provider::{
    ChatMessage, CompletionRequest, LlmEvent, LlmStream, MessagePart, Provider, Role, TokenUsage,
    ToolSchema,
};
pub use source::{EventSource, OverflowPolicy, SourceState, TriggerStream};
pub use tool::{InputSchema, PropertySchema, Tool, ToolContext, ToolFailureKind, ToolOutput, ValueType};
pub use value::{EventPriority, RiskLevel, SubscriptionPriority, TrustLevel};
pub use wake::{AgentHandle, IntegrationRequest, IntegrationSink, WakeSink};
