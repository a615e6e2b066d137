//! Interval-based schedule source.
//!
//! Each entry ticks on a fixed period. The first tick fires one full
//! period after start, not immediately. Cron grammars are out of scope —
//! a cron-capable schedule would be a separate source kind.

use aviary_core::{
    DurationMs, EventPayload, EventPriority, EventSource, EventType, SourceError, SourceId,
    SourceState, TriggerEvent, TriggerStream,
};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One schedule entry.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    /// Name carried in the event payload.
    pub name: String,
    /// Tick period.
    pub every: DurationMs,
    /// Priority of emitted events.
    pub priority: EventPriority,
}

impl ScheduleEntry {
    /// An entry at normal priority.
    pub fn new(name: impl Into<String>, every: DurationMs) -> Self {
        Self {
            name: name.into(),
            every,
            priority: EventPriority::Normal,
        }
    }

    /// Override the emitted priority.
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Emits a `scheduled` event each time an entry's period elapses.
/// Overflow policy is block: ticks wait for the consumer rather than drop.
pub struct ScheduleSource {
    id: SourceId,
    entries: Vec<ScheduleEntry>,
    state: Mutex<SourceState>,
    tx: mpsc::Sender<TriggerEvent>,
    rx: Mutex<Option<mpsc::Receiver<TriggerEvent>>>,
    cancel: Mutex<CancellationToken>,
}

impl ScheduleSource {
    /// Create a schedule source from entries.
    pub fn new(id: SourceId, entries: Vec<ScheduleEntry>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            id,
            entries,
            state: Mutex::new(SourceState::Idle),
            tx,
            rx: Mutex::new(Some(rx)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }
}

#[async_trait]
impl EventSource for ScheduleSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn name(&self) -> &str {
        "schedule"
    }

    fn description(&self) -> &str {
        "Fixed-interval schedule entries"
    }

    fn supported_event_types(&self) -> Vec<EventType> {
        vec![EventType::Scheduled]
    }

    fn state(&self) -> SourceState {
        *self.state.lock().unwrap()
    }

    async fn start(&self) -> Result<(), SourceError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == SourceState::Running {
                return Ok(());
            }
            *state = SourceState::Starting;
        }

        let cancel = {
            let mut guard = self.cancel.lock().unwrap();
            *guard = CancellationToken::new();
            guard.clone()
        };

        for entry in self.entries.clone() {
            let tx = self.tx.clone();
            let source_id = self.id.clone();
            let cancel = cancel.clone();
            let period = entry.every.to_std();
            let first_tick = tokio::time::Instant::now() + period;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(first_tick, period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let event = TriggerEvent::new(
                                source_id.clone(),
                                EventType::Scheduled,
                                EventPayload::Schedule { entry: entry.name.clone() },
                                entry.priority,
                            )
                            .with_metadata("entry", entry.name.clone());
                            debug!(source = %source_id, entry = %entry.name, "schedule tick");
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        *self.state.lock().unwrap() = SourceState::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        self.cancel.lock().unwrap().cancel();
        *self.state.lock().unwrap() = SourceState::Stopped;
        Ok(())
    }

    fn events(&self) -> TriggerStream {
        match self.rx.lock().unwrap().take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            None => Box::pin(futures::stream::empty()),
        }
    }
}
