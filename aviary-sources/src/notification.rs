//! Push-style notification source.

use aviary_core::{
    EventPayload, EventPriority, EventSource, EventType, SourceError, SourceId, SourceState,
    TriggerEvent, TriggerStream,
};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Handle for posting notifications into a [`NotificationSource`].
#[derive(Clone)]
pub struct Notifier {
    source_id: SourceId,
    tx: mpsc::UnboundedSender<TriggerEvent>,
}

impl Notifier {
    /// Post a notification at the given priority.
    pub fn post(&self, title: impl Into<String>, body: impl Into<String>, priority: EventPriority) {
        let event = TriggerEvent::new(
            self.source_id.clone(),
            EventType::Notification,
            EventPayload::Notification {
                title: title.into(),
                body: body.into(),
            },
            priority,
        );
        let _ = self.tx.send(event);
    }
}

/// A source the host application pushes notifications into. Producing has
/// no I/O of its own, so `start` only tracks lifecycle state.
pub struct NotificationSource {
    id: SourceId,
    state: Mutex<SourceState>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<TriggerEvent>>>,
}

impl NotificationSource {
    /// Create the source and its posting handle. The stream ends once
    /// every handle has been dropped.
    pub fn new(id: SourceId) -> (Self, Notifier) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Notifier {
            source_id: id.clone(),
            tx,
        };
        (
            Self {
                id,
                state: Mutex::new(SourceState::Idle),
                rx: Mutex::new(Some(rx)),
            },
            notifier,
        )
    }
}

#[async_trait]
impl EventSource for NotificationSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn name(&self) -> &str {
        "notification"
    }

    fn supported_event_types(&self) -> Vec<EventType> {
        vec![EventType::Notification]
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

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn posted_notifications_arrive_in_order() {
        let (source, notifier) = NotificationSource::new(SourceId::new("notif"));
        let mut events = source.events();
        source.start().await.unwrap();

        notifier.post("first", "a", EventPriority::Normal);
        notifier.post("second", "b", EventPriority::Urgent);

        let e1 = events.next().await.unwrap();
        let e2 = events.next().await.unwrap();
        assert!(matches!(
            e1.payload,
            EventPayload::Notification { ref title, .. } if title == "first"
        ));
        assert_eq!(e2.priority, EventPriority::Urgent);
    }
}
