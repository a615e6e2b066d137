//! ManualSource — an event source tests drive by hand.

use crate::error::SourceError;
use crate::event::{EventType, TriggerEvent};
use crate::id::SourceId;
use crate::source::{EventSource, SourceState, TriggerStream};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Handle for pushing events into a [`ManualSource`].
#[derive(Clone)]
pub struct ManualHandle {
    tx: mpsc::UnboundedSender<TriggerEvent>,
}

impl ManualHandle {
    /// Emit an event. Silently dropped once the stream is gone.
    pub fn emit(&self, event: TriggerEvent) {
        let _ = self.tx.send(event);
    }
}

/// An event source with no behavior of its own: tests push events through
/// the [`ManualHandle`]. Start/stop track lifecycle state faithfully so
/// bus lifecycle tests can observe transitions.
pub struct ManualSource {
    id: SourceId,
    types: Vec<EventType>,
    state: Mutex<SourceState>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<TriggerEvent>>>,
    /// When set, the next `start()` fails once with this error.
    fail_next_start: Mutex<Option<SourceError>>,
}

impl ManualSource {
    /// Create a source and its push handle.
    pub fn new(id: SourceId, types: impl IntoIterator<Item = EventType>) -> (Self, ManualHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                types: types.into_iter().collect(),
                state: Mutex::new(SourceState::Idle),
                rx: Mutex::new(Some(rx)),
                fail_next_start: Mutex::new(None),
            },
            ManualHandle { tx },
        )
    }

    /// Make the next `start()` call fail with the given error.
    pub fn fail_next_start(&self, err: SourceError) {
        *self.fail_next_start.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl EventSource for ManualSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn name(&self) -> &str {
        "manual"
    }

    fn supported_event_types(&self) -> Vec<EventType> {
        self.types.clone()
    }

    fn state(&self) -> SourceState {
        *self.state.lock().unwrap()
    }

    async fn start(&self) -> Result<(), SourceError> {
        let mut state = self.state.lock().unwrap();
        if *state == SourceState::Running {
            return Ok(());
        }
        *state = SourceState::Starting;
        if let Some(err) = self.fail_next_start.lock().unwrap().take() {
            *state = SourceState::Error;
            return Err(err);
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
