#![deny(missing_docs)]
//! Built-in event sources for aviary.
//!
//! Each source implements [`aviary_core::EventSource`]: lifecycle state
//! behind a mutex, an outbound channel matching its documented overflow
//! policy, and a single-consumer `events()` stream the bus takes at
//! registration.

mod agent_msg;
mod fswatch;
mod health;
mod notification;
mod schedule;

pub use agent_msg::{AgentMessageSource, AgentMessenger};
pub use fswatch::FileWatchSource;
pub use health::{HealthMetricSource, HealthProbe, HealthReading};
pub use notification::{Notifier, NotificationSource};
pub use schedule::{ScheduleEntry, ScheduleSource};
