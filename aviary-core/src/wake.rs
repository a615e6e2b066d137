//! Wake delivery boundaries: where the bus hands matched events, and how
//! the wake controller reaches an agent.

use crate::event::TriggerEvent;
use crate::id::AgentId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where the Event Bus delivers a matched `(agent, event)` pair. The Wake
/// Controller implements this; the bus holds it as `Arc<dyn WakeSink>`.
#[async_trait]
pub trait WakeSink: Send + Sync {
    /// Deliver one wake. Must not block on the agent's actual processing —
    /// queueing behind a busy agent is the sink's concern.
    async fn wake(&self, agent: &AgentId, event: TriggerEvent);
}

/// How the Wake Controller invokes an agent once it has been marked busy.
/// The runtime registers one handle per agent; it typically runs the
/// agent's turn engine and then declares completion back to the controller.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Process one event. The controller has already transitioned the
    /// agent to busy and recorded the event as current.
    async fn on_wake(&self, event: TriggerEvent);
}

/// An agent's request for an integration that does not exist yet (a custom
/// source kind). Forwarded to the host application.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRequest {
    /// Who asked.
    pub requested_by: AgentId,
    /// The kind of source being requested.
    pub source_kind: String,
    /// Free-form justification / parameters.
    pub detail: String,
}

/// Receiver for integration requests.
#[async_trait]
pub trait IntegrationSink: Send + Sync {
    /// Accept a request. Delivery is best-effort.
    async fn request(&self, req: IntegrationRequest);
}
