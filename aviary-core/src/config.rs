//! The runtime configuration surface. Every option has a stated default;
//! a default-constructed config is a working configuration.

use crate::duration::DurationMs;
use crate::value::RiskLevel;
use serde::{Deserialize, Serialize};

/// Compute-routing tier for provider selection. Higher tiers restrict
/// where conversation content may be sent.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// Any provider.
    Standard,
    /// Default tier.
    Private,
    /// Local or private-cloud providers only.
    High,
    /// Local providers only.
    Maximum,
}

impl Default for Sensitivity {
    fn default() -> Self {
        Sensitivity::Private
    }
}

/// Runtime-wide configuration. Per-component structs borrow their slice
/// of this at construction.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on agent-loop rounds within one turn.
    pub max_rounds_per_turn: u32,
    /// Events retained in the bus history ring.
    pub history_ring_capacity: usize,
    /// Minimum risk level requiring human approval.
    pub approval_threshold: RiskLevel,
    /// Tool-name globs admitted without prompting.
    pub auto_approve_patterns: Vec<String>,
    /// Tool-name globs always rejected.
    pub never_approve_patterns: Vec<String>,
    /// How long an approval prompt waits before auto-deny.
    pub approval_prompt_timeout: DurationMs,
    /// Default per-tool execution timeout.
    pub tool_execution_timeout: DurationMs,
    /// Non-streaming provider round-trip timeout.
    pub provider_timeout: DurationMs,
    /// How long a source's `start()` may take.
    pub source_start_timeout: DurationMs,
    /// Interval between polled source checks.
    pub event_monitor_interval: DurationMs,
    /// Compute-routing tier.
    pub sensitivity: Sensitivity,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_rounds_per_turn: 16,
            history_ring_capacity: 1000,
            approval_threshold: RiskLevel::Medium,
            auto_approve_patterns: Vec::new(),
            never_approve_patterns: Vec::new(),
            approval_prompt_timeout: DurationMs::from_secs(300),
            tool_execution_timeout: DurationMs::from_secs(60),
            provider_timeout: DurationMs::from_secs(120),
            source_start_timeout: DurationMs::from_secs(30),
            event_monitor_interval: DurationMs::from_secs(60),
            sensitivity: Sensitivity::Private,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let c = RuntimeConfig::default();
        assert_eq!(c.max_rounds_per_turn, 16);
        assert_eq!(c.history_ring_capacity, 1000);
        assert_eq!(c.approval_threshold, RiskLevel::Medium);
        assert!(c.auto_approve_patterns.is_empty());
        assert!(c.never_approve_patterns.is_empty());
        assert_eq!(c.approval_prompt_timeout, DurationMs::from_secs(300));
        assert_eq!(c.tool_execution_timeout, DurationMs::from_secs(60));
        assert_eq!(c.event_monitor_interval, DurationMs::from_secs(60));
        assert_eq!(c.sensitivity, Sensitivity::Private);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let c: RuntimeConfig =
            serde_json::from_str(r#"{"max_rounds_per_turn": 4}"#).unwrap();
        assert_eq!(c.max_rounds_per_turn, 4);
        assert_eq!(c.history_ring_capacity, 1000);
    }

    #[test]
    fn sensitivity_ordering() {
        assert!(Sensitivity::Standard < Sensitivity::Private);
        assert!(Sensitivity::Private < Sensitivity::High);
        assert!(Sensitivity::High < Sensitivity::Maximum);
    }
}
