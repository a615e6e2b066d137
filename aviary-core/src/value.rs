//! Ordered value enumerations: event priority, subscription priority,
//! risk level, trust level.

use serde::{Deserialize, Serialize};

/// Priority carried by a trigger event. Orders events within an agent's
/// pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    /// Background housekeeping.
    Low,
    /// Default for most events.
    Normal,
    /// Time-sensitive.
    High,
    /// Drop-everything.
    Urgent,
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Normal
    }
}

/// Priority of a subscription. Orders wake dispatch when one event matches
/// several agents — nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPriority {
    /// Woken after everyone else.
    Low,
    /// Default.
    Normal,
    /// Woken early.
    High,
    /// Woken first.
    Critical,
}

impl Default for SubscriptionPriority {
    fn default() -> Self {
        SubscriptionPriority::Normal
    }
}

/// Risk classification of a tool. Determines whether an invocation needs
/// human approval: `safe < low < medium < high < critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Read-only, no side effects.
    Safe,
    /// Reversible side effects inside a workspace.
    Low,
    /// Writes that reach the staging area.
    Medium,
    /// Writes or actions outside the workspace boundary.
    High,
    /// Destructive or irreversible.
    Critical,
}

/// Coarse trust rank an agent earns from interaction outcomes. Gates tool
/// admission together with the risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// New agent: observe only.
    Observer,
    /// May use safe tools.
    Assistant,
    /// May stage workspace changes.
    Contributor,
    /// May use high-risk tools with approval.
    Trusted,
    /// Full autonomy within policy.
    Autonomous,
}

impl TrustLevel {
    /// Map the continuous trust metric (0.0–4.0) onto the coarse rank.
    /// Crossing an integer boundary in either direction promotes/demotes.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 4.0 => TrustLevel::Autonomous,
            s if s >= 3.0 => TrustLevel::Trusted,
            s if s >= 2.0 => TrustLevel::Contributor,
            s if s >= 1.0 => TrustLevel::Assistant,
            _ => TrustLevel::Observer,
        }
    }

    /// The lower edge of this rank on the continuous metric.
    pub fn floor_score(&self) -> f64 {
        match self {
            TrustLevel::Observer => 0.0,
            TrustLevel::Assistant => 1.0,
            TrustLevel::Contributor => 2.0,
            TrustLevel::Trusted => 3.0,
            TrustLevel::Autonomous => 4.0,
        }
    }
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel::Observer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_are_totally_ordered() {
        assert!(EventPriority::Low < EventPriority::Normal);
        assert!(EventPriority::Normal < EventPriority::High);
        assert!(EventPriority::High < EventPriority::Urgent);

        assert!(SubscriptionPriority::Low < SubscriptionPriority::Normal);
        assert!(SubscriptionPriority::High < SubscriptionPriority::Critical);
    }

    #[test]
    fn risk_ordering_matches_contract() {
        assert!(RiskLevel::Safe < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn trust_from_score_boundaries() {
        assert_eq!(TrustLevel::from_score(0.0), TrustLevel::Observer);
        assert_eq!(TrustLevel::from_score(0.99), TrustLevel::Observer);
        assert_eq!(TrustLevel::from_score(1.0), TrustLevel::Assistant);
        assert_eq!(TrustLevel::from_score(2.5), TrustLevel::Contributor);
        assert_eq!(TrustLevel::from_score(3.0), TrustLevel::Trusted);
        assert_eq!(TrustLevel::from_score(4.0), TrustLevel::Autonomous);
    }

    #[test]
    fn value_enums_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&RiskLevel::Medium).unwrap(),
            "\"medium\""
        );
        assert_eq!(
            serde_json::to_string(&TrustLevel::Autonomous).unwrap(),
            "\"autonomous\""
        );
        assert_eq!(
            serde_json::to_string(&EventPriority::Urgent).unwrap(),
            "\"urgent\""
        );
    }
}
