#![deny(missing_docs)]
//! # aviary — umbrella crate
//!
//! A single import surface for the aviary runtime. Re-exports the member
//! crates behind feature flags, plus a `prelude` for the happy path.

#[cfg(feature = "bus")]
pub use aviary_bus;
#[cfg(feature = "core")]
pub use aviary_core;
#[cfg(feature = "governor")]
pub use aviary_governor;
#[cfg(feature = "turn-loop")]
pub use aviary_loop;
#[cfg(feature = "sources")]
pub use aviary_sources;
#[cfg(feature = "staging")]
pub use aviary_staging;
#[cfg(feature = "tool")]
pub use aviary_tool;
#[cfg(feature = "wake")]
pub use aviary_wake;

/// Happy-path imports for composing an aviary runtime.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use aviary_core::{
        AgentHandle, AgentId, AgentIdentity, AgentProfile, AgentStatus, ApprovalPrompter,
        ApprovalRequest, ApprovalResponse, ChatMessage, CompletionRequest, Decision, EventFilter,
        EventPayload, EventPriority, EventSource, EventType, InputSchema, LlmEvent, Provider,
        RiskLevel, RuntimeConfig, SourceId, Subscription, SubscriptionPriority, Tool, ToolContext,
        ToolOutput, TriggerEvent, TrustLevel, WakeSink, WorkspaceId,
    };

    #[cfg(feature = "bus")]
    pub use aviary_bus::{BusConfig, EventBus};

    #[cfg(feature = "sources")]
    pub use aviary_sources::{
        AgentMessageSource, FileWatchSource, HealthMetricSource, NotificationSource,
        ScheduleEntry, ScheduleSource,
    };

    #[cfg(feature = "wake")]
    pub use aviary_wake::{AgentRegistry, FsIdentityStore, MemoryIdentityStore, WakeController};

    #[cfg(feature = "tool")]
    pub use aviary_tool::ToolRegistry;

    #[cfg(feature = "governor")]
    pub use aviary_governor::{ApprovalPolicy, FsPolicyStore, Governor, PolicySet};

    #[cfg(feature = "turn-loop")]
    pub use aviary_loop::{
        ProviderRouter, TurnEngine, TurnEngineConfig, TurnEvent, TurnExit, TurnObserver,
        TurnRequest,
    };

    #[cfg(feature = "staging")]
    pub use aviary_staging::{
        Block, BlockBody, ChangePayload, ChangeType, Document, StagingEngine, WorkspaceMeta,
    };
}
