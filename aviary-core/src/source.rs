//! The event source contract — a lazy, single-consumer stream of
//! trigger events with an explicit lifecycle.

use crate::duration::DurationMs;
use crate::error::SourceError;
use crate::event::{EventType, TriggerEvent};
use crate::id::SourceId;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// The lazy event stream a source hands to the bus. Single-consumer.
pub type TriggerStream = Pin<Box<dyn Stream<Item = TriggerEvent> + Send>>;

/// Source lifecycle. `idle → starting → running → (paused | stopped | error)`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// Constructed, never started.
    Idle,
    /// `start()` in progress.
    Starting,
    /// Producing events.
    Running,
    /// Temporarily suspended; stream stays open.
    Paused,
    /// Stopped; the stream has drained.
    Stopped,
    /// Failed; `start()` may be retried depending on the error.
    Error,
}

/// What a source does when its outbound channel is full. A property of the
/// source, documented here so the bus knows what loss (if any) to expect.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Production blocks until the consumer catches up. No loss.
    Block,
    /// Oldest events are dropped once the buffer holds `capacity` items.
    DropOldest {
        /// Buffer size before dropping begins.
        capacity: usize,
    },
    /// Duplicate events within `window` are collapsed, keeping the latest.
    Coalesce {
        /// Coalescing window.
        window: DurationMs,
    },
}

/// An event source: a unique id, a lifecycle, and one lazy stream.
///
/// Ownership: after registration the Event Bus exclusively owns the source
/// until unregister. `events()` is single-consumer — the first call yields
/// the live stream; later calls yield an empty stream.
///
/// `start` is idempotent: on a `Running` source it is a no-op success; on an
/// `Error` source it transitions through `Starting` and tries again.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Unique source id.
    fn id(&self) -> &SourceId;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// What this source is for.
    fn description(&self) -> &str {
        ""
    }

    /// The event types this source can emit.
    fn supported_event_types(&self) -> Vec<EventType>;

    /// Current lifecycle state.
    fn state(&self) -> SourceState;

    /// Full-channel behavior of the outbound stream.
    fn overflow_policy(&self) -> OverflowPolicy {
        OverflowPolicy::Block
    }

    /// Begin producing events.
    async fn start(&self) -> Result<(), SourceError>;

    /// Stop producing and drain gracefully. Idempotent.
    async fn stop(&self) -> Result<(), SourceError>;

    /// Take the outbound stream. Single-consumer.
    fn events(&self) -> TriggerStream;
}
