//! The wake controller — per-agent serialization of event processing.
//!
//! One agent processes one event at a time. Wakes for a busy agent queue
//! in priority order (insertion-stable within a priority class); wakes for
//! an offline agent reroute to a profile-compatible peer or wait in the
//! queue until the agent returns.

use crate::registry::AgentRegistry;
use aviary_core::{
    AgentHandle, AgentId, AgentProfile, AgentStatus, EventPriority, TriggerEvent, WakeError,
    WakeSink,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

struct QueuedWake {
    priority: EventPriority,
    seq: u64,
    event: TriggerEvent,
}

impl PartialEq for QueuedWake {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueuedWake {}

impl PartialOrd for QueuedWake {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedWake {
    // Max-heap: higher priority first, then earlier insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct ControllerState {
    queues: HashMap<AgentId, BinaryHeap<QueuedWake>>,
    current: HashMap<AgentId, TriggerEvent>,
    seq: u64,
}

/// The per-agent serializer that awakens agents and queues events while
/// they are busy. Exclusive owner of the pending queues and current-event
/// map.
pub struct WakeController {
    registry: Arc<AgentRegistry>,
    state: Mutex<ControllerState>,
    handlers: Mutex<HashMap<AgentId, Arc<dyn AgentHandle>>>,
}

impl WakeController {
    /// Create a controller over a registry.
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            state: Mutex::new(ControllerState {
                queues: HashMap::new(),
                current: HashMap::new(),
                seq: 0,
            }),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// The registry this controller transitions statuses through.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Register the callback that processes an agent's wakes, then drain
    /// anything that queued before the handler existed.
    pub fn set_handler(&self, agent: AgentId, handle: Arc<dyn AgentHandle>) {
        self.handlers.lock().unwrap().insert(agent.clone(), handle);
        self.pump(&agent);
    }

    /// The event an agent is currently processing.
    pub fn current_event(&self, agent: &AgentId) -> Option<TriggerEvent> {
        self.state.lock().unwrap().current.get(agent).cloned()
    }

    /// How many events are queued behind an agent.
    pub fn pending_count(&self, agent: &AgentId) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(agent)
            .map_or(0, |q| q.len())
    }

    /// The agent declares its current event processed. Pops the next
    /// pending wake (priority, then insertion order) or returns the agent
    /// to `Available`.
    pub fn complete(&self, agent: &AgentId) -> Result<(), WakeError> {
        let next = {
            let mut state = self.state.lock().unwrap();
            if state.current.remove(agent).is_none() {
                return Err(WakeError::NoCurrentEvent(agent.clone()));
            }
            let next = state.queues.get_mut(agent).and_then(|q| q.pop());
            if let Some(queued) = &next {
                state.current.insert(agent.clone(), queued.event.clone());
            }
            next
        };

        match next {
            Some(queued) => {
                debug!(%agent, event = %queued.event.id, "resuming queued event");
                self.invoke(agent, queued.event);
            }
            None => {
                self.registry.set_status(agent, AgentStatus::Available)?;
            }
        }
        Ok(())
    }

    /// Change an agent's availability. Going `Offline`/`Maintenance`
    /// preserves the pending queue; returning to `Available` resumes it.
    pub fn set_status(&self, agent: &AgentId, status: AgentStatus) -> Result<(), WakeError> {
        if status != AgentStatus::Available {
            // Whatever was in flight will not be completed by this agent.
            self.state.lock().unwrap().current.remove(agent);
        }
        self.registry.set_status(agent, status)?;
        if status == AgentStatus::Available {
            self.pump(agent);
        }
        Ok(())
    }

    /// Pick the available agent with the largest capability overlap
    /// (ties: higher trust, then lower id) and wake it. Returns the
    /// chosen agent.
    pub async fn route_to_capable(
        &self,
        event: TriggerEvent,
        required: &[String],
    ) -> Option<AgentId> {
        let candidates = self.registry.agents_in_status(AgentStatus::Available);
        let chosen = candidates
            .into_iter()
            .max_by(|a, b| {
                let overlap_a = required.iter().filter(|c| a.capabilities.contains(c.as_str())).count();
                let overlap_b = required.iter().filter(|c| b.capabilities.contains(c.as_str())).count();
                overlap_a
                    .cmp(&overlap_b)
                    .then(a.trust.cmp(&b.trust))
                    .then(b.id.cmp(&a.id))
            })?
            .id;
        self.wake(&chosen, event).await;
        Some(chosen)
    }

    /// Wake an available concierge-profile agent with this event.
    pub async fn route_to_concierge(&self, event: TriggerEvent) -> Option<AgentId> {
        let mut candidates: Vec<AgentId> = self
            .registry
            .agents_in_status(AgentStatus::Available)
            .into_iter()
            .filter(|a| a.profile == AgentProfile::Concierge)
            .map(|a| a.id)
            .collect();
        candidates.sort();
        let chosen = candidates.into_iter().next()?;
        self.wake(&chosen, event).await;
        Some(chosen)
    }

    fn enqueue(&self, agent: &AgentId, event: TriggerEvent) {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let seq = state.seq;
        state
            .queues
            .entry(agent.clone())
            .or_default()
            .push(QueuedWake {
                priority: event.priority,
                seq,
                event,
            });
    }

    /// If the agent is available and has pending wakes, start the next one.
    fn pump(&self, agent: &AgentId) {
        if self.pending_count(agent) == 0 {
            return;
        }
        if !matches!(self.registry.mark_busy_if_available(agent), Ok(true)) {
            return;
        }
        let queued = {
            let mut state = self.state.lock().unwrap();
            match state.queues.get_mut(agent).and_then(|q| q.pop()) {
                Some(queued) => {
                    state.current.insert(agent.clone(), queued.event.clone());
                    Some(queued)
                }
                None => None,
            }
        };
        match queued {
            Some(queued) => self.invoke(agent, queued.event),
            // Raced empty: give the slot back.
            None => {
                let _ = self.registry.set_status(agent, AgentStatus::Available);
            }
        }
    }

    /// Hand the event to the agent's handler on its own task. The agent
    /// is already `Busy` with this event recorded as current.
    fn invoke(&self, agent: &AgentId, event: TriggerEvent) {
        let handler = self.handlers.lock().unwrap().get(agent).cloned();
        match handler {
            Some(handler) => {
                tokio::spawn(async move {
                    handler.on_wake(event).await;
                });
            }
            None => {
                // No handler yet: requeue and free the agent. set_handler
                // will pump the queue.
                warn!(%agent, "wake with no handler registered; queueing");
                self.state.lock().unwrap().current.remove(agent);
                self.enqueue(agent, event);
                let _ = self.registry.set_status(agent, AgentStatus::Available);
            }
        }
    }

    fn route_fallback(&self, agent: &AgentId, event: TriggerEvent) {
        let profile = self.registry.identity(agent).map(|a| a.profile);
        let Some(profile) = profile else {
            self.enqueue(agent, event);
            return;
        };
        let mut peers: Vec<AgentId> = self
            .registry
            .agents_in_status(AgentStatus::Available)
            .into_iter()
            .filter(|a| a.id != *agent && a.profile == profile)
            .map(|a| a.id)
            .collect();
        peers.sort();

        for peer in peers {
            if matches!(self.registry.mark_busy_if_available(&peer), Ok(true)) {
                debug!(from = %agent, to = %peer, event = %event.id, "rerouted wake");
                self.state
                    .lock()
                    .unwrap()
                    .current
                    .insert(peer.clone(), event.clone());
                self.invoke(&peer, event);
                return;
            }
        }
        // No capable peer right now: hold it for the original agent.
        self.enqueue(agent, event);
    }
}

#[async_trait]
impl WakeSink for WakeController {
    async fn wake(&self, agent: &AgentId, event: TriggerEvent) {
        match self.registry.status(agent) {
            None => {
                warn!(%agent, event = %event.id, "wake for unknown agent dropped");
            }
            Some(AgentStatus::Available) => {
                if matches!(self.registry.mark_busy_if_available(agent), Ok(true)) {
                    self.state
                        .lock()
                        .unwrap()
                        .current
                        .insert(agent.clone(), event.clone());
                    self.invoke(agent, event);
                } else {
                    // Lost the race to another wake: queue behind it.
                    self.enqueue(agent, event);
                }
            }
            Some(AgentStatus::Busy) => {
                self.enqueue(agent, event);
            }
            Some(AgentStatus::Offline) | Some(AgentStatus::Maintenance) => {
                self.route_fallback(agent, event);
            }
        }
    }
}
