//! Approval policy: thresholds, tool-name glob patterns, and the durable
//! policy store.

use aviary_core::{AgentId, DurationMs, PolicyError, RiskLevel, RuntimeConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Approval policy for one scope (global or a single agent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Minimum risk level that requires a human prompt.
    pub threshold: RiskLevel,
    /// Tool-name globs admitted without prompting.
    pub auto_approve: Vec<String>,
    /// Tool-name globs always rejected.
    pub never_approve: Vec<String>,
    /// How long a prompt waits before auto-deny.
    pub prompt_timeout: DurationMs,
}

impl ApprovalPolicy {
    /// Build the global policy from the runtime config.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            threshold: config.approval_threshold,
            auto_approve: config.auto_approve_patterns.clone(),
            never_approve: config.never_approve_patterns.clone(),
            prompt_timeout: config.approval_prompt_timeout,
        }
    }

    /// Whether a tool name matches any auto-approve pattern.
    pub fn matches_auto(&self, tool_name: &str) -> bool {
        matches_any(&self.auto_approve, tool_name)
    }

    /// Whether a tool name matches any never-approve pattern.
    pub fn matches_never(&self, tool_name: &str) -> bool {
        matches_any(&self.never_approve, tool_name)
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|p| match glob::Pattern::new(p) {
        Ok(pattern) => pattern.matches(name),
        Err(err) => {
            warn!(pattern = %p, error = %err, "skipping unparseable policy pattern");
            false
        }
    })
}

/// The full policy state: one global policy plus per-agent overrides.
/// An agent without an override uses the global policy unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySet {
    /// Fallback policy.
    pub global: ApprovalPolicy,
    /// Per-agent overrides.
    #[serde(default)]
    pub agents: HashMap<AgentId, ApprovalPolicy>,
}

impl PolicySet {
    /// The effective policy for an agent.
    pub fn effective(&self, agent: &AgentId) -> &ApprovalPolicy {
        self.agents.get(agent).unwrap_or(&self.global)
    }

    /// Append an agent-scoped auto-approve pattern for a tool (the
    /// `AlwaysAllow` path). Creates the agent override from the global
    /// policy if needed.
    pub fn always_allow(&mut self, agent: &AgentId, tool_name: &str) {
        let policy = self
            .agents
            .entry(agent.clone())
            .or_insert_with(|| self.global.clone());
        if !policy.auto_approve.iter().any(|p| p == tool_name) {
            policy.auto_approve.push(tool_name.to_string());
        }
    }
}

/// Durable backing for the policy set.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Load the stored policy set, or None if none was saved yet.
    async fn load(&self) -> Result<Option<PolicySet>, PolicyError>;

    /// Persist the full policy set.
    async fn save(&self, policies: &PolicySet) -> Result<(), PolicyError>;
}

/// Policy store backed by one JSON file.
pub struct FsPolicyStore {
    path: PathBuf,
}

impl FsPolicyStore {
    /// Store policies at the given file path. Parent directories are
    /// created lazily on first save.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl PolicyStore for FsPolicyStore {
    async fn load(&self) -> Result<Option<PolicySet>, PolicyError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| PolicyError::Store(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PolicyError::Store(e.to_string())),
        }
    }

    async fn save(&self, policies: &PolicySet) -> Result<(), PolicyError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PolicyError::Store(e.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(policies)
            .map_err(|e| PolicyError::Store(e.to_string()))?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| PolicyError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_config_table() {
        let p = ApprovalPolicy::default();
        assert_eq!(p.threshold, RiskLevel::Medium);
        assert!(p.auto_approve.is_empty());
        assert!(p.never_approve.is_empty());
        assert_eq!(p.prompt_timeout, DurationMs::from_secs(300));
    }

    #[test]
    fn glob_patterns_match() {
        let p = ApprovalPolicy {
            auto_approve: vec!["read_*".into()],
            never_approve: vec!["delete_*".into(), "exec".into()],
            ..Default::default()
        };
        assert!(p.matches_auto("read_file"));
        assert!(!p.matches_auto("write_file"));
        assert!(p.matches_never("delete_file"));
        assert!(p.matches_never("exec"));
        assert!(!p.matches_never("execute"));
    }

    #[test]
    fn bad_patterns_never_match() {
        let p = ApprovalPolicy {
            auto_approve: vec!["[unclosed".into()],
            ..Default::default()
        };
        assert!(!p.matches_auto("anything"));
    }

    #[test]
    fn always_allow_scopes_to_agent() {
        let mut set = PolicySet::default();
        let agent = AgentId::new("a1");
        let other = AgentId::new("a2");
        set.always_allow(&agent, "send_mail");
        set.always_allow(&agent, "send_mail");

        assert!(set.effective(&agent).matches_auto("send_mail"));
        assert!(!set.effective(&other).matches_auto("send_mail"));
        assert_eq!(set.effective(&agent).auto_approve.len(), 1);
    }

    #[tokio::test]
    async fn fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPolicyStore::new(&dir.path().join("policies.json"));
        assert!(store.load().await.unwrap().is_none());

        let mut set = PolicySet::default();
        set.always_allow(&AgentId::new("a1"), "read_file");
        store.save(&set).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, set);
    }
}
