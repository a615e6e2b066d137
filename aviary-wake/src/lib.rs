#![deny(missing_docs)]
//! Agent registry and wake controller for aviary.
//!
//! The registry is the exclusive owner of agent identities (durable) and
//! statuses (ephemeral). The controller serializes event processing per
//! agent: it is the only path into `Busy`, owns the pending queues, and
//! reroutes wakes for offline agents to profile-compatible peers.

mod controller;
mod registry;

pub use controller::WakeController;
pub use registry::{AgentRegistry, FsIdentityStore, IdentityStore, MemoryIdentityStore};
