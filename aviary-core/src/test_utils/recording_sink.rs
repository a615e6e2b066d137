//! RecordingWakeSink — captures every wake the bus delivers.

use crate::event::TriggerEvent;
use crate::id::AgentId;
use crate::wake::WakeSink;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::Notify;

/// A wake sink that records `(agent, event)` pairs for assertions.
pub struct RecordingWakeSink {
    wakes: Mutex<Vec<(AgentId, TriggerEvent)>>,
    notify: Notify,
}

impl RecordingWakeSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self {
            wakes: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Everything recorded so far, in delivery order.
    pub fn recorded(&self) -> Vec<(AgentId, TriggerEvent)> {
        self.wakes.lock().unwrap().clone()
    }

    /// Number of recorded wakes.
    pub fn len(&self) -> usize {
        self.wakes.lock().unwrap().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `n` wakes have been recorded.
    pub async fn wait_for(&self, n: usize) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.len() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl Default for RecordingWakeSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WakeSink for RecordingWakeSink {
    async fn wake(&self, agent: &AgentId, event: TriggerEvent) {
        self.wakes.lock().unwrap().push((agent.clone(), event));
        self.notify.notify_waiters();
    }
}
