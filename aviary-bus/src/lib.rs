#![deny(missing_docs)]
//! Event bus for aviary.
//!
//! The bus owns every registered [`EventSource`] and its listener task.
//! Each listener drains the source's single-consumer stream and dispatches
//! every item: append to the history ring, match subscriptions, de-duplicate
//! agents, order by subscription priority, and hand `(agent, event)` pairs
//! to the configured [`WakeSink`]. Events from one source are dispatched in
//! emission order; interleaving across sources is unconstrained.

mod backoff;
mod ring;

pub use backoff::RetryBackoff;
pub use ring::EventRing;

use aviary_core::{
    AgentId, BusError, DurationMs, EventSource, IntegrationRequest, IntegrationSink, SourceError,
    SourceId, Subscription, SubscriptionPriority, TriggerEvent, WakeSink,
};
use futures::StreamExt;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Bus configuration, carved out of the runtime config.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// History ring capacity.
    pub ring_capacity: usize,
    /// Budget for one `start()` call.
    pub start_timeout: DurationMs,
    /// Total start attempts for a transiently unavailable source.
    pub start_attempts: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1000,
            start_timeout: DurationMs::from_secs(30),
            start_attempts: 5,
        }
    }
}

struct SourceEntry {
    source: Arc<dyn EventSource>,
    listener: JoinHandle<()>,
}

struct Inner {
    config: BusConfig,
    sources: tokio::sync::Mutex<HashMap<SourceId, SourceEntry>>,
    subscriptions: Mutex<HashMap<AgentId, Vec<Subscription>>>,
    ring: Mutex<EventRing>,
    wake_sink: Mutex<Option<Arc<dyn WakeSink>>>,
    integration_sink: Mutex<Option<Arc<dyn IntegrationSink>>>,
}

/// The central router of trigger events from sources to subscribed agents.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create a bus with the given configuration.
    pub fn new(config: BusConfig) -> Self {
        let ring = EventRing::new(config.ring_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                sources: tokio::sync::Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(HashMap::new()),
                ring: Mutex::new(ring),
                wake_sink: Mutex::new(None),
                integration_sink: Mutex::new(None),
            }),
        }
    }

    /// Set where matched events are delivered. Until a sink is set,
    /// dispatched events are logged and lost.
    pub fn set_wake_sink(&self, sink: Arc<dyn WakeSink>) {
        *self.inner.wake_sink.lock().unwrap() = Some(sink);
    }

    /// Set where integration requests are forwarded.
    pub fn set_integration_sink(&self, sink: Arc<dyn IntegrationSink>) {
        *self.inner.integration_sink.lock().unwrap() = Some(sink);
    }

    /// Register a source, start it, and begin listening.
    ///
    /// `start()` runs under the start timeout. `TransientUnavailable` is
    /// retried with jittered exponential backoff up to the configured
    /// attempt budget; `AccessDenied` (and any other failure) propagates
    /// immediately and the source stays in its error state. The listener
    /// task is only spawned after a successful start.
    pub async fn register_source(&self, source: Arc<dyn EventSource>) -> Result<(), BusError> {
        let id = source.id().clone();
        {
            let sources = self.inner.sources.lock().await;
            if sources.contains_key(&id) {
                return Err(BusError::SourceExists(id));
            }
        }

        self.start_with_retry(&*source, &id).await?;

        let stream = source.events();
        let inner = Arc::clone(&self.inner);
        let listener_id = id.clone();
        let listener = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(event) = stream.next().await {
                dispatch_event(&inner, event).await;
            }
            debug!(source = %listener_id, "source stream ended");
        });

        info!(source = %id, name = source.name(), "source registered");
        self.inner
            .sources
            .lock()
            .await
            .insert(id, SourceEntry { source, listener });
        Ok(())
    }

    async fn start_with_retry(
        &self,
        source: &dyn EventSource,
        id: &SourceId,
    ) -> Result<(), BusError> {
        let mut backoff = RetryBackoff::source_start();
        let timeout = self.inner.config.start_timeout.to_std();
        loop {
            match tokio::time::timeout(timeout, source.start()).await {
                Err(_) => return Err(BusError::StartTimeout(id.clone())),
                Ok(Ok(())) => return Ok(()),
                Ok(Err(SourceError::TransientUnavailable(detail)))
                    if backoff.attempts() + 1 < self.inner.config.start_attempts =>
                {
                    let delay = backoff.next_delay();
                    warn!(
                        source = %id,
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        %detail,
                        "source transiently unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(err)) => {
                    warn!(source = %id, error = %err, "source start failed");
                    return Err(BusError::Start(err));
                }
            }
        }
    }

    /// Stop a source, cancel its listener, and drop all bus state for it.
    /// Wakes already handed to the sink are not recalled.
    pub async fn unregister_source(&self, id: &SourceId) -> Result<(), BusError> {
        let entry = self
            .inner
            .sources
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| BusError::SourceNotFound(id.clone()))?;
        if let Err(err) = entry.source.stop().await {
            warn!(source = %id, error = %err, "source stop failed during unregister");
        }
        entry.listener.abort();
        info!(source = %id, "source unregistered");
        Ok(())
    }

    /// Current lifecycle state of a registered source.
    pub async fn source_state(&self, id: &SourceId) -> Result<aviary_core::SourceState, BusError> {
        let sources = self.inner.sources.lock().await;
        let entry = sources
            .get(id)
            .ok_or_else(|| BusError::SourceNotFound(id.clone()))?;
        Ok(entry.source.state())
    }

    /// Add a subscription for an agent.
    pub fn subscribe(&self, subscription: Subscription) {
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .entry(subscription.agent.clone())
            .or_default()
            .push(subscription);
    }

    /// Remove every subscription held by an agent.
    pub fn unsubscribe_all(&self, agent: &AgentId) {
        self.inner.subscriptions.lock().unwrap().remove(agent);
    }

    /// The subscriptions an agent currently holds.
    pub fn subscriptions_of(&self, agent: &AgentId) -> Vec<Subscription> {
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .get(agent)
            .cloned()
            .unwrap_or_default()
    }

    /// The most recent `n` events, oldest first.
    pub fn recent_events(&self, n: usize) -> Vec<TriggerEvent> {
        self.inner.ring.lock().unwrap().recent(n)
    }

    /// Inject an event as if a source had emitted it. Used by push-style
    /// integrations and tests.
    pub async fn dispatch(&self, event: TriggerEvent) {
        dispatch_event(&self.inner, event).await;
    }

    /// Forward an integration request to the host application.
    pub async fn request_integration(&self, req: IntegrationRequest) {
        let sink = self.inner.integration_sink.lock().unwrap().clone();
        match sink {
            Some(sink) => sink.request(req).await,
            None => warn!(
                requested_by = %req.requested_by,
                kind = %req.source_kind,
                "integration request dropped: no sink configured"
            ),
        }
    }

    /// Stop every source and cancel every listener.
    pub async fn shutdown(&self) {
        let mut sources = self.inner.sources.lock().await;
        for (id, entry) in sources.drain() {
            if let Err(err) = entry.source.stop().await {
                warn!(source = %id, error = %err, "source stop failed during shutdown");
            }
            entry.listener.abort();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

/// Dispatch one event: ring, match, de-duplicate, order, deliver.
async fn dispatch_event(inner: &Inner, event: TriggerEvent) {
    inner.ring.lock().unwrap().push(event.clone());

    // One entry per agent at the highest subscription priority that matched.
    let mut matched: Vec<(SubscriptionPriority, AgentId)> = {
        let subscriptions = inner.subscriptions.lock().unwrap();
        subscriptions
            .iter()
            .filter_map(|(agent, subs)| {
                subs.iter()
                    .filter(|s| s.filter.matches(&event))
                    .map(|s| s.priority)
                    .max()
                    .map(|priority| (priority, agent.clone()))
            })
            .collect()
    };
    matched.sort_by_key(|(priority, agent)| (Reverse(*priority), agent.clone()));

    if matched.is_empty() {
        debug!(event = %event.id, "no matching subscriptions");
        return;
    }

    let sink = inner.wake_sink.lock().unwrap().clone();
    let Some(sink) = sink else {
        warn!(event = %event.id, "event dropped: no wake sink configured");
        return;
    };

    for (priority, agent) in matched {
        debug!(event = %event.id, %agent, ?priority, "waking agent");
        sink.wake(&agent, event.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aviary_core::test_utils::{ManualSource, RecordingWakeSink};
    use aviary_core::{
        EventFilter, EventPayload, EventPriority, EventType, SourceState,
    };

    fn notification(source: &SourceId, n: u32) -> TriggerEvent {
        TriggerEvent::new(
            source.clone(),
            EventType::Notification,
            EventPayload::Notification {
                title: format!("n{n}"),
                body: String::new(),
            },
            EventPriority::Normal,
        )
    }

    fn sub(agent: &str, filter: EventFilter) -> Subscription {
        Subscription::new(AgentId::new(agent), filter)
    }

    #[tokio::test]
    async fn register_starts_source_and_delivers_events() {
        let bus = EventBus::default();
        let sink = Arc::new(RecordingWakeSink::new());
        bus.set_wake_sink(sink.clone());
        bus.subscribe(sub("a1", EventFilter::any()));

        let id = SourceId::new("manual");
        let (source, handle) = ManualSource::new(id.clone(), [EventType::Notification]);
        bus.register_source(Arc::new(source)).await.unwrap();
        assert_eq!(bus.source_state(&id).await.unwrap(), SourceState::Running);

        handle.emit(notification(&id, 1));
        sink.wait_for(1).await;
        let recorded = sink.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, AgentId::new("a1"));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let bus = EventBus::default();
        let id = SourceId::new("dup");
        let (s1, _h1) = ManualSource::new(id.clone(), [EventType::Notification]);
        let (s2, _h2) = ManualSource::new(id.clone(), [EventType::Notification]);
        bus.register_source(Arc::new(s1)).await.unwrap();
        let err = bus.register_source(Arc::new(s2)).await.unwrap_err();
        assert!(matches!(err, BusError::SourceExists(_)));
    }

    #[tokio::test]
    async fn access_denied_propagates_without_retry() {
        let bus = EventBus::default();
        let (source, _handle) =
            ManualSource::new(SourceId::new("denied"), [EventType::Notification]);
        source.fail_next_start(SourceError::AccessDenied);
        let err = bus.register_source(Arc::new(source)).await.unwrap_err();
        assert!(matches!(err, BusError::Start(SourceError::AccessDenied)));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_unavailable_is_retried() {
        let bus = EventBus::default();
        let (source, handle) =
            ManualSource::new(SourceId::new("flaky"), [EventType::Notification]);
        source.fail_next_start(SourceError::TransientUnavailable("warming up".into()));
        let sink = Arc::new(RecordingWakeSink::new());
        bus.set_wake_sink(sink.clone());
        bus.subscribe(sub("a1", EventFilter::any()));

        // Second attempt succeeds after the backoff sleep (auto-advanced).
        bus.register_source(Arc::new(source)).await.unwrap();

        handle.emit(notification(&SourceId::new("flaky"), 1));
        sink.wait_for(1).await;
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn dedup_one_wake_per_agent_per_event() {
        let bus = EventBus::default();
        let sink = Arc::new(RecordingWakeSink::new());
        bus.set_wake_sink(sink.clone());
        // Two overlapping subscriptions for the same agent.
        bus.subscribe(sub("a1", EventFilter::any()));
        bus.subscribe(sub(
            "a1",
            EventFilter::any().types([EventType::Notification]),
        ));

        bus.dispatch(notification(&SourceId::new("s"), 1)).await;
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_orders_by_subscription_priority_then_agent_id() {
        let bus = EventBus::default();
        let sink = Arc::new(RecordingWakeSink::new());
        bus.set_wake_sink(sink.clone());
        bus.subscribe(sub("zeta", EventFilter::any()));
        bus.subscribe(
            sub("beta", EventFilter::any()).with_priority(SubscriptionPriority::Critical),
        );
        bus.subscribe(sub("alpha", EventFilter::any()));

        bus.dispatch(notification(&SourceId::new("s"), 1)).await;
        let order: Vec<String> = sink
            .recorded()
            .iter()
            .map(|(a, _)| a.to_string())
            .collect();
        assert_eq!(order, vec!["beta", "alpha", "zeta"]);
    }

    #[tokio::test]
    async fn no_sink_drops_events_but_keeps_history() {
        let bus = EventBus::default();
        bus.subscribe(sub("a1", EventFilter::any()));
        bus.dispatch(notification(&SourceId::new("s"), 1)).await;
        assert_eq!(bus.recent_events(10).len(), 1);
    }

    #[tokio::test]
    async fn per_source_emission_order_is_preserved_per_agent() {
        let bus = EventBus::default();
        let sink = Arc::new(RecordingWakeSink::new());
        bus.set_wake_sink(sink.clone());
        bus.subscribe(sub("a1", EventFilter::any()));
        bus.subscribe(sub("a2", EventFilter::any()));

        let id = SourceId::new("ordered");
        let (source, handle) = ManualSource::new(id.clone(), [EventType::Notification]);
        bus.register_source(Arc::new(source)).await.unwrap();

        let events: Vec<TriggerEvent> = (1..=3).map(|n| notification(&id, n)).collect();
        let ids: Vec<_> = events.iter().map(|e| e.id.clone()).collect();
        for e in events {
            handle.emit(e);
        }
        sink.wait_for(6).await;

        for agent in ["a1", "a2"] {
            let seen: Vec<_> = sink
                .recorded()
                .iter()
                .filter(|(a, _)| a.as_str() == agent)
                .map(|(_, e)| e.id.clone())
                .collect();
            assert_eq!(seen, ids, "agent {agent} saw events out of order");
        }
    }

    #[tokio::test]
    async fn unregister_stops_source_and_listener() {
        let bus = EventBus::default();
        let sink = Arc::new(RecordingWakeSink::new());
        bus.set_wake_sink(sink.clone());
        bus.subscribe(sub("a1", EventFilter::any()));

        let id = SourceId::new("gone");
        let (source, handle) = ManualSource::new(id.clone(), [EventType::Notification]);
        bus.register_source(Arc::new(source)).await.unwrap();
        bus.unregister_source(&id).await.unwrap();

        // Emissions after unregister go nowhere.
        handle.emit(notification(&id, 1));
        tokio::task::yield_now().await;
        assert!(sink.is_empty());
        assert!(matches!(
            bus.unregister_source(&id).await,
            Err(BusError::SourceNotFound(_))
        ));
    }
}
