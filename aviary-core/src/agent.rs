//! Agent identity and status.

use crate::id::AgentId;
use crate::value::TrustLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What role an agent plays. Routing fallback prefers agents with the
/// same profile; the concierge catches everything unrouted.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentProfile {
    /// General-purpose front desk; receives unroutable events.
    Concierge,
    /// Specialist in a named domain.
    Specialist {
        /// The domain this agent specializes in.
        domain: String,
    },
}

/// Persistent agent record. Outlives processes; every mutation goes
/// through the registry and its durable store. Trust moves only through
/// recorded interaction outcomes, except by explicit user action.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Stable id.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Role profile.
    pub profile: AgentProfile,
    /// Capability tags used for routing.
    pub capabilities: BTreeSet<String>,
    /// Earned trust rank.
    pub trust: TrustLevel,
    /// When the identity was created.
    pub created_at: DateTime<Utc>,
}

impl AgentIdentity {
    /// Create a new identity with a fresh id, observer trust, and the
    /// current timestamp.
    pub fn new(name: impl Into<String>, profile: AgentProfile) -> Self {
        Self {
            id: AgentId::fresh(),
            name: name.into(),
            profile,
            capabilities: BTreeSet::new(),
            trust: TrustLevel::Observer,
            created_at: Utc::now(),
        }
    }

    /// Add a capability tag.
    pub fn with_capability(mut self, cap: impl Into<String>) -> Self {
        self.capabilities.insert(cap.into());
        self
    }
}

/// Ephemeral agent availability. `Busy` is entered only via the Wake
/// Controller and left only when the current event is marked processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Idle, can be woken.
    Available,
    /// Processing an event.
    Busy,
    /// Not reachable; events queue or reroute.
    Offline,
    /// Deliberately taken out of rotation.
    Maintenance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_identity_defaults() {
        let a = AgentIdentity::new("scout", AgentProfile::Concierge).with_capability("triage");
        assert_eq!(a.trust, TrustLevel::Observer);
        assert!(a.capabilities.contains("triage"));
        assert_eq!(a.profile, AgentProfile::Concierge);
    }

    #[test]
    fn profile_serde() {
        let p = AgentProfile::Specialist {
            domain: "calendar".into(),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["kind"], "specialist");
        assert_eq!(json["domain"], "calendar");
    }

    #[test]
    fn identity_roundtrip() {
        let a = AgentIdentity::new("archivist", AgentProfile::Specialist {
            domain: "notes".into(),
        });
        let json = serde_json::to_value(&a).unwrap();
        let back: AgentIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(a, back);
    }
}
