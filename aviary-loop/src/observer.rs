//! The typed progress stream a turn emits for the UI layer.

use aviary_core::{Decision, TokenUsage, ToolCallId, ToolOutput};
use tokio::sync::mpsc;

/// One observable step of a turn.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// A completed assistant text segment.
    Segment(String),
    /// The model proposed a tool call; admission comes next.
    ToolPending {
        /// Call id.
        call: ToolCallId,
        /// Tool name.
        name: String,
    },
    /// The governor ruled on a pending call.
    ToolDecision {
        /// Call id.
        call: ToolCallId,
        /// The ruling.
        decision: Decision,
    },
    /// A tool finished (or failed, or was rejected).
    ToolResult {
        /// Call id.
        call: ToolCallId,
        /// The outcome fed back to the model.
        output: ToolOutput,
    },
    /// Usage delta from one provider call.
    Usage(TokenUsage),
    /// The turn finished normally.
    Completed,
    /// The turn hit the round bound.
    Truncated,
    /// The turn was cancelled.
    Cancelled,
    /// The turn failed.
    Errored {
        /// Human-readable failure description.
        message: String,
    },
}

/// Sending half of the observer stream. Emission is best-effort: a
/// dropped receiver never affects the turn.
#[derive(Clone)]
pub struct TurnObserver {
    tx: Option<mpsc::UnboundedSender<TurnEvent>>,
}

impl TurnObserver {
    /// An observer nobody is listening to.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create an observer and its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TurnEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Emit one event.
    pub fn emit(&self, event: TurnEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_observer_swallows_events() {
        TurnObserver::disabled().emit(TurnEvent::Completed);
    }

    #[tokio::test]
    async fn channel_observer_delivers_in_order() {
        let (observer, mut rx) = TurnObserver::channel();
        observer.emit(TurnEvent::TextDelta("a".into()));
        observer.emit(TurnEvent::Completed);
        assert_eq!(rx.recv().await, Some(TurnEvent::TextDelta("a".into())));
        assert_eq!(rx.recv().await, Some(TurnEvent::Completed));
    }
}
