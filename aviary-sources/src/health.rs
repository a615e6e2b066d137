//! Health-metric source: polls a probe on the monitor interval.

use aviary_core::{
    DurationMs, EventPayload, EventPriority, EventSource, EventType, SourceError, SourceId,
    SourceState, TriggerEvent, TriggerStream,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// One probe reading.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReading {
    /// Metric name.
    pub name: String,
    /// Observed value.
    pub value: f64,
    /// Priority the reading should dispatch at.
    pub priority: EventPriority,
}

/// A health probe the source polls. Return `None` when there is nothing
/// worth reporting this cycle.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Take one sample.
    async fn sample(&self) -> Option<HealthReading>;
}

/// Polls a [`HealthProbe`] every monitor interval and emits
/// `health-metric` events for each reading.
pub struct HealthMetricSource {
    id: SourceId,
    probe: Arc<dyn HealthProbe>,
    interval: DurationMs,
    state: Mutex<SourceState>,
    tx: mpsc::Sender<TriggerEvent>,
    rx: Mutex<Option<mpsc::Receiver<TriggerEvent>>>,
    cancel: Mutex<CancellationToken>,
}

impl HealthMetricSource {
    /// Create a source polling `probe` every `interval`.
    pub fn new(id: SourceId, probe: Arc<dyn HealthProbe>, interval: DurationMs) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            id,
            probe,
            interval,
            state: Mutex::new(SourceState::Idle),
            tx,
            rx: Mutex::new(Some(rx)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }
}

#[async_trait]
impl EventSource for HealthMetricSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn name(&self) -> &str {
        "health-metric"
    }

    fn supported_event_types(&self) -> Vec<EventType> {
        vec![EventType::HealthMetric]
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
        let probe = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        let source_id = self.id.clone();
        let period = self.interval.to_std();
        let first_tick = tokio::time::Instant::now() + period;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(reading) = probe.sample().await else {
                            continue;
                        };
                        let event = TriggerEvent::new(
                            source_id.clone(),
                            EventType::HealthMetric,
                            EventPayload::HealthMetric {
                                name: reading.name.clone(),
                                value: reading.value,
                            },
                            reading.priority,
                        )
                        .with_metadata("metric", reading.name);
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

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
