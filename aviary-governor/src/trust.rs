//! Trust accounting: a continuous metric per (agent, domain) with an
//! aggregate, updated from interaction outcomes.
//!
//! The update rule:
//!
//! ```text
//! new = clamp(current + success_rate · ln(1 + total)/10 − error_rate · 2.0, 0.0, 4.0)
//! ```
//!
//! where `success_rate = successes/total` and `error_rate = corrections/total`.
//! Crossing an integer boundary changes the coarse [`TrustLevel`].

use aviary_core::{AgentId, InteractionOutcome, TrustLevel};
use std::collections::HashMap;
use std::sync::Mutex;

/// Accumulated record for one (agent, domain) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustRecord {
    /// Successful interactions.
    pub successes: u64,
    /// User-corrected interactions.
    pub corrections: u64,
    /// Total interactions.
    pub total: u64,
    /// Continuous trust score, clamped to 0.0–4.0.
    pub score: f64,
}

impl TrustRecord {
    fn seeded(score: f64) -> Self {
        Self {
            successes: 0,
            corrections: 0,
            total: 0,
            score,
        }
    }

    fn apply(&mut self, outcome: &InteractionOutcome) {
        self.total += 1;
        if outcome.success {
            self.successes += 1;
        }
        if outcome.correction {
            self.corrections += 1;
        }
        let total = self.total as f64;
        let success_rate = self.successes as f64 / total;
        let error_rate = self.corrections as f64 / total;
        let delta = success_rate * ((1.0 + total).ln() / 10.0) - error_rate * 2.0;
        self.score = (self.score + delta).clamp(0.0, 4.0);
    }
}

/// A boundary crossing on the aggregate metric.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelChange {
    /// Level before the outcome.
    pub from: TrustLevel,
    /// Level after the outcome.
    pub to: TrustLevel,
}

/// Per-(agent, domain) trust records plus a per-agent aggregate.
pub struct TrustLedger {
    domains: Mutex<HashMap<(AgentId, String), TrustRecord>>,
    aggregates: Mutex<HashMap<AgentId, TrustRecord>>,
}

impl TrustLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
            aggregates: Mutex::new(HashMap::new()),
        }
    }

    /// Record one outcome. `current_level` seeds an agent the ledger has
    /// not seen yet (at that level's floor score), so a long-lived agent
    /// does not restart from zero after a process restart. Returns the
    /// aggregate level change, if the outcome crossed a boundary.
    pub fn record(
        &self,
        outcome: &InteractionOutcome,
        current_level: TrustLevel,
    ) -> Option<LevelChange> {
        {
            let mut domains = self.domains.lock().unwrap();
            domains
                .entry((outcome.agent_id.clone(), outcome.domain.clone()))
                .or_insert_with(|| TrustRecord::seeded(current_level.floor_score()))
                .apply(outcome);
        }

        let mut aggregates = self.aggregates.lock().unwrap();
        let record = aggregates
            .entry(outcome.agent_id.clone())
            .or_insert_with(|| TrustRecord::seeded(current_level.floor_score()));
        let before = TrustLevel::from_score(record.score);
        record.apply(outcome);
        let after = TrustLevel::from_score(record.score);

        (before != after).then_some(LevelChange {
            from: before,
            to: after,
        })
    }

    /// The record for one (agent, domain), if any outcomes were recorded.
    pub fn domain_record(&self, agent: &AgentId, domain: &str) -> Option<TrustRecord> {
        self.domains
            .lock()
            .unwrap()
            .get(&(agent.clone(), domain.to_string()))
            .cloned()
    }

    /// The aggregate record for an agent.
    pub fn aggregate(&self, agent: &AgentId) -> Option<TrustRecord> {
        self.aggregates.lock().unwrap().get(agent).cloned()
    }
}

impl Default for TrustLedger {
    fn default() -> Self {
        Self::new()
    }
}
