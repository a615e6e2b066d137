#![deny(missing_docs)]
//! Approval and trust governor for aviary.
//!
//! Decides, before each tool invocation, whether to admit, prompt, or
//! reject. Every decision is recorded against the [`ToolCallId`] so an
//! auditor can verify that a gated tool executed iff an admit decision
//! referenced it. Denials are data fed back to the agent, never errors.

mod policy;
mod trust;

pub use policy::{ApprovalPolicy, FsPolicyStore, PolicySet, PolicyStore};
pub use trust::{LevelChange, TrustLedger, TrustRecord};

use aviary_core::{
    AdmitMode, AgentIdentity, ApprovalPrompter, ApprovalRequest, ApprovalResponse, Decision,
    InteractionOutcome, RejectReason, Tool, ToolCallId, TrustLevel,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const INPUT_PREVIEW_LIMIT: usize = 240;

/// Notified when an agent's aggregate trust crosses a level boundary.
/// The runtime wires this to the agent registry's durable trust update.
#[async_trait]
pub trait TrustEscalation: Send + Sync {
    /// The agent's coarse trust level changed.
    async fn on_level_change(&self, agent: &aviary_core::AgentId, change: &LevelChange);
}

/// The governor: policy admission plus trust accounting.
pub struct Governor {
    policies: tokio::sync::Mutex<PolicySet>,
    store: Option<Arc<dyn PolicyStore>>,
    prompter: Arc<dyn ApprovalPrompter>,
    ledger: TrustLedger,
    escalation: Mutex<Option<Arc<dyn TrustEscalation>>>,
    audit: Mutex<HashMap<ToolCallId, Decision>>,
}

impl Governor {
    /// Create a governor with an in-memory policy set.
    pub fn new(policies: PolicySet, prompter: Arc<dyn ApprovalPrompter>) -> Self {
        Self {
            policies: tokio::sync::Mutex::new(policies),
            store: None,
            prompter,
            ledger: TrustLedger::new(),
            escalation: Mutex::new(None),
            audit: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a durable policy store. `AlwaysAllow` answers persist
    /// through it.
    pub fn with_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Load policies from the attached store, if it holds any.
    pub async fn load_policies(&self) -> Result<(), aviary_core::PolicyError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(saved) = store.load().await? {
            *self.policies.lock().await = saved;
        }
        Ok(())
    }

    /// Register the trust escalation hook.
    pub fn set_escalation(&self, escalation: Arc<dyn TrustEscalation>) {
        *self.escalation.lock().unwrap() = Some(escalation);
    }

    /// Decide whether one tool invocation may proceed.
    ///
    /// The admission order is: never-approve patterns, then the trust
    /// requirement, then the below-threshold / auto-approve fast paths,
    /// then the human prompt (bounded by the policy's prompt timeout;
    /// timeout means denied).
    pub async fn admit(
        &self,
        agent: &AgentIdentity,
        tool: &dyn Tool,
        call_id: &ToolCallId,
        input: &serde_json::Value,
    ) -> Decision {
        let decision = self.decide(agent, tool, call_id, input).await;
        match &decision {
            Decision::Admitted(mode) => {
                info!(agent = %agent.id, tool = tool.name(), ?mode, call = %call_id, "tool admitted");
            }
            Decision::Rejected(reason) => {
                warn!(agent = %agent.id, tool = tool.name(), ?reason, call = %call_id, "tool rejected");
            }
        }
        self.audit
            .lock()
            .unwrap()
            .insert(call_id.clone(), decision.clone());
        decision
    }

    async fn decide(
        &self,
        agent: &AgentIdentity,
        tool: &dyn Tool,
        call_id: &ToolCallId,
        input: &serde_json::Value,
    ) -> Decision {
        let (threshold, prompt_timeout, never, auto) = {
            let policies = self.policies.lock().await;
            let policy = policies.effective(&agent.id);
            (
                policy.threshold,
                policy.prompt_timeout,
                policy.matches_never(tool.name()),
                policy.matches_auto(tool.name()),
            )
        };

        if never {
            return Decision::Rejected(RejectReason::PolicyForbidden);
        }

        if agent.trust < tool.required_trust() {
            return Decision::Rejected(RejectReason::InsufficientTrust {
                required: tool.required_trust(),
                actual: agent.trust,
            });
        }

        if tool.risk_level() < threshold || auto {
            let mode = if auto {
                AdmitMode::AutoApproved
            } else {
                AdmitMode::BelowThreshold
            };
            return Decision::Admitted(mode);
        }

        let request = ApprovalRequest {
            agent_id: agent.id.clone(),
            tool_call: call_id.clone(),
            tool_name: tool.name().to_string(),
            description: tool.describe_action(input),
            input_preview: preview(input),
            risk: tool.risk_level(),
        };

        let response =
            tokio::time::timeout(prompt_timeout.to_std(), self.prompter.prompt(request)).await;
        match response {
            Err(_) => Decision::Rejected(RejectReason::Timeout),
            Ok(ApprovalResponse::Deny) => Decision::Rejected(RejectReason::UserDenied),
            Ok(ApprovalResponse::Approve) => Decision::Admitted(AdmitMode::UserApproved),
            Ok(ApprovalResponse::AlwaysAllow) => {
                self.persist_always_allow(&agent.id, tool.name()).await;
                Decision::Admitted(AdmitMode::UserApproved)
            }
        }
    }

    async fn persist_always_allow(&self, agent: &aviary_core::AgentId, tool_name: &str) {
        let snapshot = {
            let mut policies = self.policies.lock().await;
            policies.always_allow(agent, tool_name);
            policies.clone()
        };
        if let Some(store) = &self.store {
            if let Err(err) = store.save(&snapshot).await {
                warn!(error = %err, "failed to persist always-allow pattern");
            }
        }
    }

    /// The decision recorded for a tool call, if one was made.
    pub fn decision_for(&self, call_id: &ToolCallId) -> Option<Decision> {
        self.audit.lock().unwrap().get(call_id).cloned()
    }

    /// Record an interaction outcome and propagate any coarse trust level
    /// change through the escalation hook. `current_level` is the agent's
    /// level as the registry knows it.
    pub async fn record_outcome(&self, outcome: InteractionOutcome, current_level: TrustLevel) {
        let change = self.ledger.record(&outcome, current_level);
        if let Some(change) = change {
            info!(
                agent = %outcome.agent_id,
                from = ?change.from,
                to = ?change.to,
                "trust level changed"
            );
            let escalation = self.escalation.lock().unwrap().clone();
            if let Some(escalation) = escalation {
                escalation.on_level_change(&outcome.agent_id, &change).await;
            }
        }
    }

    /// The trust ledger, for inspection.
    pub fn ledger(&self) -> &TrustLedger {
        &self.ledger
    }
}

fn preview(input: &serde_json::Value) -> String {
    let rendered = input.to_string();
    if rendered.len() <= INPUT_PREVIEW_LIMIT {
        return rendered;
    }
    let mut cut = INPUT_PREVIEW_LIMIT;
    while !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &rendered[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use aviary_core::test_utils::StaticTool;
    use aviary_core::{AgentProfile, RiskLevel};
    use serde_json::json;
    use std::collections::VecDeque;

    struct ScriptedPrompter {
        responses: Mutex<VecDeque<ApprovalResponse>>,
        prompts: Mutex<Vec<ApprovalRequest>>,
    }

    impl ScriptedPrompter {
        fn new(responses: impl IntoIterator<Item = ApprovalResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompt_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ApprovalPrompter for ScriptedPrompter {
        async fn prompt(&self, request: ApprovalRequest) -> ApprovalResponse {
            self.prompts.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted response left")
        }
    }

    /// A prompter that never answers, for timeout tests.
    struct SilentPrompter;

    #[async_trait]
    impl ApprovalPrompter for SilentPrompter {
        async fn prompt(&self, _request: ApprovalRequest) -> ApprovalResponse {
            std::future::pending().await
        }
    }

    fn agent(trust: TrustLevel) -> AgentIdentity {
        let mut a = AgentIdentity::new("tester", AgentProfile::Concierge);
        a.trust = trust;
        a
    }

    fn call_id() -> ToolCallId {
        ToolCallId::fresh()
    }

    #[tokio::test]
    async fn below_threshold_admits_without_prompt() {
        let prompter = ScriptedPrompter::new([]);
        let governor = Governor::new(PolicySet::default(), prompter.clone());
        let tool = StaticTool::new("read_file", json!(null)).with_risk(RiskLevel::Low);

        let decision = governor
            .admit(&agent(TrustLevel::Observer), &tool, &call_id(), &json!({}))
            .await;
        assert_eq!(decision, Decision::Admitted(AdmitMode::BelowThreshold));
        assert_eq!(prompter.prompt_count(), 0);
    }

    #[tokio::test]
    async fn never_pattern_rejects_before_anything_else() {
        let mut set = PolicySet::default();
        set.global.never_approve = vec!["delete_*".into()];
        let governor = Governor::new(set, ScriptedPrompter::new([]));
        let tool = StaticTool::new("delete_file", json!(null)).with_risk(RiskLevel::Safe);

        let decision = governor
            .admit(&agent(TrustLevel::Autonomous), &tool, &call_id(), &json!({}))
            .await;
        assert_eq!(decision, Decision::Rejected(RejectReason::PolicyForbidden));
    }

    #[tokio::test]
    async fn insufficient_trust_rejects_even_below_threshold() {
        let governor = Governor::new(PolicySet::default(), ScriptedPrompter::new([]));
        let tool = StaticTool::new("stage_change", json!(null))
            .with_risk(RiskLevel::Low)
            .with_required_trust(TrustLevel::Contributor);

        let decision = governor
            .admit(&agent(TrustLevel::Assistant), &tool, &call_id(), &json!({}))
            .await;
        assert_eq!(
            decision,
            Decision::Rejected(RejectReason::InsufficientTrust {
                required: TrustLevel::Contributor,
                actual: TrustLevel::Assistant,
            })
        );
    }

    #[tokio::test]
    async fn high_risk_prompts_and_deny_rejects() {
        let prompter = ScriptedPrompter::new([ApprovalResponse::Deny]);
        let governor = Governor::new(PolicySet::default(), prompter.clone());
        let tool = StaticTool::new("send_mail", json!(null)).with_risk(RiskLevel::High);

        let decision = governor
            .admit(&agent(TrustLevel::Trusted), &tool, &call_id(), &json!({"to": "x"}))
            .await;
        assert_eq!(decision, Decision::Rejected(RejectReason::UserDenied));
        assert_eq!(prompter.prompt_count(), 1);
    }

    #[tokio::test]
    async fn approve_admits_once() {
        let prompter =
            ScriptedPrompter::new([ApprovalResponse::Approve, ApprovalResponse::Approve]);
        let governor = Governor::new(PolicySet::default(), prompter.clone());
        let tool = StaticTool::new("send_mail", json!(null)).with_risk(RiskLevel::High);

        let a = agent(TrustLevel::Trusted);
        let first = governor.admit(&a, &tool, &call_id(), &json!({})).await;
        let second = governor.admit(&a, &tool, &call_id(), &json!({})).await;
        assert_eq!(first, Decision::Admitted(AdmitMode::UserApproved));
        assert_eq!(second, Decision::Admitted(AdmitMode::UserApproved));
        // Plain approve does not become a standing pattern.
        assert_eq!(prompter.prompt_count(), 2);
    }

    #[tokio::test]
    async fn always_allow_becomes_agent_scoped_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsPolicyStore::new(&dir.path().join("p.json")));
        let prompter = ScriptedPrompter::new([ApprovalResponse::AlwaysAllow]);
        let governor =
            Governor::new(PolicySet::default(), prompter.clone()).with_store(store.clone());
        let tool = StaticTool::new("send_mail", json!(null)).with_risk(RiskLevel::High);

        let a = agent(TrustLevel::Trusted);
        let first = governor.admit(&a, &tool, &call_id(), &json!({})).await;
        assert_eq!(first, Decision::Admitted(AdmitMode::UserApproved));

        // The second call is auto-approved with no prompt.
        let second = governor.admit(&a, &tool, &call_id(), &json!({})).await;
        assert_eq!(second, Decision::Admitted(AdmitMode::AutoApproved));
        assert_eq!(prompter.prompt_count(), 1);

        // And the pattern is on disk, scoped to this agent.
        let persisted = store.load().await.unwrap().unwrap();
        assert!(persisted.effective(&a.id).matches_auto("send_mail"));

        let other = agent(TrustLevel::Trusted);
        assert!(!persisted.effective(&other.id).matches_auto("send_mail"));
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_timeout_denies() {
        let governor = Governor::new(PolicySet::default(), Arc::new(SilentPrompter));
        let tool = StaticTool::new("send_mail", json!(null)).with_risk(RiskLevel::Critical);

        let id = call_id();
        let decision = governor
            .admit(&agent(TrustLevel::Autonomous), &tool, &id, &json!({}))
            .await;
        assert_eq!(decision, Decision::Rejected(RejectReason::Timeout));
        assert_eq!(governor.decision_for(&id), Some(decision));
    }

    #[tokio::test]
    async fn decisions_are_audited_by_call_id() {
        let governor = Governor::new(PolicySet::default(), ScriptedPrompter::new([]));
        let tool = StaticTool::new("read_file", json!(null));
        let id = call_id();
        governor
            .admit(&agent(TrustLevel::Observer), &tool, &id, &json!({}))
            .await;
        assert!(governor.decision_for(&id).unwrap().is_admitted());
        assert!(governor.decision_for(&call_id()).is_none());
    }

    #[tokio::test]
    async fn outcome_boundary_crossing_fires_escalation() {
        struct Recorder(Mutex<Vec<(aviary_core::AgentId, LevelChange)>>);

        #[async_trait]
        impl TrustEscalation for Recorder {
            async fn on_level_change(
                &self,
                agent: &aviary_core::AgentId,
                change: &LevelChange,
            ) {
                self.0.lock().unwrap().push((agent.clone(), change.clone()));
            }
        }

        let governor = Governor::new(PolicySet::default(), ScriptedPrompter::new([]));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        governor.set_escalation(recorder.clone());

        let a = agent(TrustLevel::Contributor);
        governor
            .record_outcome(
                InteractionOutcome::corrected(a.id.clone(), "mail"),
                TrustLevel::Contributor,
            )
            .await;

        let changes = recorder.0.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].1.to, TrustLevel::Observer);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = json!({"text": "ß".repeat(400)});
        let p = preview(&long);
        assert!(p.chars().count() <= INPUT_PREVIEW_LIMIT + 1);
        assert!(p.ends_with('…'));
        assert_eq!(preview(&json!({"a": 1})), "{\"a\":1}");
    }
}
