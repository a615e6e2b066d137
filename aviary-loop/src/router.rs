//! Provider routing: pick a backend for a turn given sensitivity,
//! latency, and capability requirements.

use aviary_core::{Provider, Sensitivity};
use std::sync::Arc;
use tracing::debug;

/// Where a provider's compute runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// On this device.
    Local,
    /// In infrastructure the user controls.
    PrivateCloud,
    /// Public cloud.
    Cloud,
}

/// Rough capability tier of a provider's default model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    /// Good enough for routine turns.
    Standard,
    /// Frontier-tier reasoning.
    High,
}

/// How soon the user is waiting on the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    /// The user is watching.
    Interactive,
    /// Triggered work; latency is secondary.
    Background,
}

/// What the turn needs from a provider.
#[derive(Debug, Clone)]
pub struct RouteQuery {
    /// Rough size of the assembled context.
    pub estimated_tokens: u32,
    /// Whether the turn surfaces tools.
    pub requires_tools: bool,
    /// Interactive or background.
    pub latency_class: LatencyClass,
    /// Needed capability tier.
    pub capability: Capability,
    /// Data sensitivity tier.
    pub sensitivity: Sensitivity,
}

/// One routable provider.
pub struct ProviderEntry {
    /// Display name.
    pub name: String,
    /// The backend.
    pub provider: Arc<dyn Provider>,
    /// Where it runs.
    pub locality: Locality,
    /// What it can do.
    pub capability: Capability,
}

/// Chooses a provider for each turn.
///
/// Policy: `maximum` sensitivity → local only; `high` → local or private
/// cloud; interactive latency prefers local; high capability prefers
/// cloud. Failover to the next candidate on hard failure happens only
/// when the agent's policy permits it.
pub struct ProviderRouter {
    entries: Vec<ProviderEntry>,
    allow_failover: bool,
}

impl ProviderRouter {
    /// Create a router over a set of providers.
    pub fn new(entries: Vec<ProviderEntry>) -> Self {
        Self {
            entries,
            allow_failover: false,
        }
    }

    /// Permit substituting an alternate provider when the preferred one
    /// is unreachable.
    pub fn with_failover(mut self) -> Self {
        self.allow_failover = true;
        self
    }

    /// Candidates permitted by the sensitivity tier, most preferred
    /// first. Deterministic: ties keep registration order.
    pub fn candidates(&self, query: &RouteQuery) -> Vec<&ProviderEntry> {
        let mut permitted: Vec<(i32, usize, &ProviderEntry)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| match query.sensitivity {
                Sensitivity::Maximum => e.locality == Locality::Local,
                Sensitivity::High => {
                    matches!(e.locality, Locality::Local | Locality::PrivateCloud)
                }
                _ => true,
            })
            .map(|(i, e)| (self.preference(e, query), i, e))
            .collect();
        permitted.sort_by_key(|(score, index, _)| (std::cmp::Reverse(*score), *index));
        permitted.into_iter().map(|(_, _, e)| e).collect()
    }

    fn preference(&self, entry: &ProviderEntry, query: &RouteQuery) -> i32 {
        let mut score = 0;
        if query.latency_class == LatencyClass::Interactive && entry.locality == Locality::Local {
            score += 2;
        }
        if query.capability == Capability::High && entry.locality == Locality::Cloud {
            score += 2;
        }
        if entry.capability >= query.capability {
            score += 1;
        }
        score
    }

    /// Pick the preferred reachable provider. Without failover the first
    /// candidate is returned regardless of reachability — its failure
    /// surfaces to the turn.
    pub async fn select(&self, query: &RouteQuery) -> Option<Arc<dyn Provider>> {
        let candidates = self.candidates(query);
        if candidates.is_empty() {
            return None;
        }
        if !self.allow_failover {
            return Some(Arc::clone(&candidates[0].provider));
        }
        for entry in &candidates {
            if entry.provider.is_available().await {
                debug!(provider = %entry.name, "routed");
                return Some(Arc::clone(&entry.provider));
            }
            debug!(provider = %entry.name, "candidate unavailable, trying next");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aviary_core::test_utils::ScriptedProvider;

    fn entry(name: &str, locality: Locality, capability: Capability) -> ProviderEntry {
        ProviderEntry {
            name: name.into(),
            provider: Arc::new(ScriptedProvider::new([])),
            locality,
            capability,
        }
    }

    fn query(sensitivity: Sensitivity, latency: LatencyClass, capability: Capability) -> RouteQuery {
        RouteQuery {
            estimated_tokens: 1000,
            requires_tools: true,
            latency_class: latency,
            capability,
            sensitivity,
        }
    }

    fn router() -> ProviderRouter {
        ProviderRouter::new(vec![
            entry("ollama", Locality::Local, Capability::Standard),
            entry("private", Locality::PrivateCloud, Capability::Standard),
            entry("frontier", Locality::Cloud, Capability::High),
        ])
    }

    #[test]
    fn maximum_sensitivity_is_local_only() {
        let r = router();
        let names: Vec<&str> = r
            .candidates(&query(
                Sensitivity::Maximum,
                LatencyClass::Background,
                Capability::Standard,
            ))
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["ollama"]);
    }

    #[test]
    fn high_sensitivity_permits_private_cloud() {
        let r = router();
        let names: Vec<&str> = r
            .candidates(&query(
                Sensitivity::High,
                LatencyClass::Background,
                Capability::Standard,
            ))
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert!(names.contains(&"ollama"));
        assert!(names.contains(&"private"));
        assert!(!names.contains(&"frontier"));
    }

    #[test]
    fn interactive_prefers_local() {
        let r = router();
        let first = r.candidates(&query(
            Sensitivity::Private,
            LatencyClass::Interactive,
            Capability::Standard,
        ))[0]
            .name
            .clone();
        assert_eq!(first, "ollama");
    }

    #[test]
    fn high_capability_prefers_cloud() {
        let r = router();
        let first = r.candidates(&query(
            Sensitivity::Private,
            LatencyClass::Background,
            Capability::High,
        ))[0]
            .name
            .clone();
        assert_eq!(first, "frontier");
    }

    #[tokio::test]
    async fn select_without_failover_returns_preferred() {
        let r = router();
        let p = r
            .select(&query(
                Sensitivity::Maximum,
                LatencyClass::Interactive,
                Capability::Standard,
            ))
            .await;
        assert!(p.is_some());
    }

    #[tokio::test]
    async fn empty_candidate_set_yields_none() {
        let r = ProviderRouter::new(vec![entry(
            "frontier",
            Locality::Cloud,
            Capability::High,
        )]);
        let p = r
            .select(&query(
                Sensitivity::Maximum,
                LatencyClass::Interactive,
                Capability::Standard,
            ))
            .await;
        assert!(p.is_none());
    }
}
