//! Agent-to-agent message source.
//!
//! Delivery targeting rides on event metadata: the sender names the
//! recipient in `metadata["to"]`, and receiving agents subscribe with a
//! metadata filter on their own id.

use aviary_core::{
    AgentId, EventPayload, EventPriority, EventSource, EventType, SourceError, SourceId,
    SourceState, TriggerEvent, TriggerStream,
};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Handle agents (or the runtime on their behalf) use to message other
/// agents.
#[derive(Clone)]
pub struct AgentMessenger {
    source_id: SourceId,
    tx: mpsc::UnboundedSender<TriggerEvent>,
}

impl AgentMessenger {
    /// Send a message from one agent to another.
    pub fn send(
        &self,
        from: AgentId,
        to: &AgentId,
        body: impl Into<String>,
        priority: EventPriority,
    ) {
        let event = TriggerEvent::new(
            self.source_id.clone(),
            EventType::AgentMessage,
            EventPayload::AgentMessage {
                from,
                body: body.into(),
            },
            priority,
        )
        .with_metadata("to", to.as_str());
        let _ = self.tx.send(event);
    }
}

/// Carries agent-to-agent messages onto the bus.
pub struct AgentMessageSource {
    id: SourceId,
    state: Mutex<SourceState>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<TriggerEvent>>>,
}

impl AgentMessageSource {
    /// Create the source and its messenger handle.
    pub fn new(id: SourceId) -> (Self, AgentMessenger) {
        let (tx, rx) = mpsc::unbounded_channel();
        let messenger = AgentMessenger {
            source_id: id.clone(),
            tx,
        };
        (
            Self {
                id,
                state: Mutex::new(SourceState::Idle),
                rx: Mutex::new(Some(rx)),
            },
            messenger,
        )
    }
}

#[async_trait]
impl EventSource for AgentMessageSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn name(&self) -> &str {
        "agent-message"
    }

    fn supported_event_types(&self) -> Vec<EventType> {
        vec![EventType::AgentMessage]
    }

    fn state(&self) -> SourceState {
        *self.state.lock().unwrap()
    }

    async fn start(&self) -> Result<(), SourceError> {
        let mut state = self.state.lock().unwrap();
        if *state == SourceState::Running {
            return Ok(());
        }
        *state = SourceState::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        *self.state.lock().unwrap() = SourceState::Stopped;
        Ok(())
    }

    fn events(&self) -> TriggerStream {
        match self.rx.lock().unwrap().take() {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(futures::stream::empty()),
        }
    }
}
