//! Trigger events, the subscription filter, and the matching rule.

use crate::id::{AgentId, EventId, SourceId};
use crate::value::{EventPriority, SubscriptionPriority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// The kind of event a source emits. Sources declare which kinds they can
/// produce; filters constrain on them.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A schedule entry fired.
    Scheduled,
    /// A watched file changed.
    FileChanged,
    /// A calendar item is due.
    Calendar,
    /// A user-facing notification.
    Notification,
    /// A message from another agent.
    AgentMessage,
    /// A health probe reading.
    HealthMetric,
    /// An inbound message from an external channel.
    Messaging,
    /// An inbound webhook delivery.
    Webhook,
    /// A new item in a feed.
    Rss,
    /// A polled API observed a change.
    ApiPoll,
    /// Integrator-defined kind.
    Custom(String),
}

/// What changed for a [`EventPayload::FileChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    /// Path was created.
    Created,
    /// Path contents changed.
    Modified,
    /// Path was removed.
    Removed,
}

/// Event payload — a closed tagged enum, one variant per built-in source
/// kind plus a JSON escape hatch for integrators. Consumers must handle
/// known variants exhaustively and pass unknown ones through untouched.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A named schedule entry ticked.
    Schedule {
        /// The entry that fired.
        entry: String,
    },
    /// A filesystem change.
    FileChange {
        /// Affected path.
        path: PathBuf,
        /// What happened to it.
        kind: FileChangeKind,
    },
    /// A calendar item.
    Calendar {
        /// Store-assigned item identifier.
        item_id: String,
        /// Item title.
        title: String,
        /// When the item starts.
        starts_at: DateTime<Utc>,
    },
    /// A notification delivered to the user.
    Notification {
        /// Notification title.
        title: String,
        /// Notification body.
        body: String,
    },
    /// A message from one agent to another.
    AgentMessage {
        /// Sending agent.
        from: AgentId,
        /// Message body.
        body: String,
    },
    /// A health probe reading.
    HealthMetric {
        /// Metric name.
        name: String,
        /// Observed value.
        value: f64,
    },
    /// Integrator-defined payload.
    Json {
        /// Arbitrary payload data.
        data: serde_json::Value,
    },
}

/// An immutable trigger event. Once emitted by a source it is never
/// mutated — the bus, queues, and history ring share clones.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Unique event id.
    pub id: EventId,
    /// The source that emitted it.
    pub source_id: SourceId,
    /// Event kind.
    pub event_type: EventType,
    /// Typed payload.
    pub payload: EventPayload,
    /// Dispatch priority.
    pub priority: EventPriority,
    /// When the source emitted it.
    pub timestamp: DateTime<Utc>,
    /// Free-form routing metadata (exact-match filterable).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TriggerEvent {
    /// Create an event with a fresh id and the current timestamp.
    pub fn new(
        source_id: SourceId,
        event_type: EventType,
        payload: EventPayload,
        priority: EventPriority,
    ) -> Self {
        Self {
            id: EventId::fresh(),
            source_id,
            event_type,
            payload,
            priority,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata key/value pair.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Conjunction of optional predicates over a trigger event. An empty filter
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Match only these event types (None = any).
    pub types: Option<HashSet<EventType>>,
    /// Match only these sources (None = any).
    pub sources: Option<HashSet<SourceId>>,
    /// Match only events at or above this priority (None = any).
    pub min_priority: Option<EventPriority>,
    /// Every listed key must be present with exactly this value.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl EventFilter {
    /// A filter that matches every event.
    pub fn any() -> Self {
        Self::default()
    }

    /// Constrain to a set of event types.
    pub fn types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.types = Some(types.into_iter().collect());
        self
    }

    /// Constrain to a set of sources.
    pub fn sources(mut self, sources: impl IntoIterator<Item = SourceId>) -> Self {
        self.sources = Some(sources.into_iter().collect());
        self
    }

    /// Require a minimum event priority.
    pub fn min_priority(mut self, p: EventPriority) -> Self {
        self.min_priority = Some(p);
        self
    }

    /// Require a metadata key to hold exactly this value.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The matching rule: every present predicate must hold.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(sources) = &self.sources {
            if !sources.contains(&event.source_id) {
                return false;
            }
        }
        if let Some(min) = self.min_priority {
            if event.priority < min {
                return false;
            }
        }
        self.metadata
            .iter()
            .all(|(k, v)| event.metadata.get(k) == Some(v))
    }
}

/// One agent's interest in a class of events. An agent may hold several
/// subscriptions; dispatch de-duplicates so one event wakes the agent at
/// most once, at the highest subscription priority that matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// The subscribing agent.
    pub agent: AgentId,
    /// What to match.
    pub filter: EventFilter,
    /// Ordering among agents woken by the same event.
    pub priority: SubscriptionPriority,
}

impl Subscription {
    /// Create a subscription at normal priority.
    pub fn new(agent: AgentId, filter: EventFilter) -> Self {
        Self {
            agent,
            filter,
            priority: SubscriptionPriority::Normal,
        }
    }

    /// Override the subscription priority.
    pub fn with_priority(mut self, priority: SubscriptionPriority) -> Self {
        self.priority = priority;
        self
    }
}
