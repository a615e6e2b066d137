//! Bounded history ring of recently dispatched events.

use aviary_core::TriggerEvent;
use std::collections::VecDeque;

/// Fixed-capacity ring. Pushing at capacity drops exactly the oldest
/// event. Retained for replay and debugging, never consulted on the
/// dispatch path.
pub struct EventRing {
    events: VecDeque<TriggerEvent>,
    capacity: usize,
}

impl EventRing {
    /// Create a ring holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an event, evicting the oldest if full.
    pub fn push(&mut self, event: TriggerEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// The most recent `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<TriggerEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the ring holds nothing.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
