//! Approval types — requests, responses, decisions, and the prompter
//! boundary the UI layer implements.
//!
//! Approval is a message, not an exception: denials and trust violations
//! flow back to the agent through the same tool-result channel as
//! successes, so the agent can reason about them in-conversation.

use crate::id::{AgentId, ToolCallId};
use crate::value::{RiskLevel, TrustLevel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A request for human sign-off on one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// The agent proposing the call.
    pub agent_id: AgentId,
    /// The tool call being gated.
    pub tool_call: ToolCallId,
    /// Tool name.
    pub tool_name: String,
    /// The tool's own one-line description of this invocation.
    pub description: String,
    /// Truncated rendering of the input.
    pub input_preview: String,
    /// Risk classification of the tool.
    pub risk: RiskLevel,
}

/// The user's answer to an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalResponse {
    /// Allow this invocation.
    Approve,
    /// Allow this invocation and auto-approve this tool for this agent
    /// from now on (persisted to the policy store).
    AlwaysAllow,
    /// Refuse this invocation.
    Deny,
}

/// How an admitted call got through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmitMode {
    /// Risk below the approval threshold.
    BelowThreshold,
    /// Tool name matched an auto-approve pattern.
    AutoApproved,
    /// The user approved when prompted.
    UserApproved,
}

/// Why a call was refused.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Tool name matched a never-approve pattern.
    PolicyForbidden,
    /// The user denied the prompt.
    UserDenied,
    /// No answer arrived before the prompt timeout.
    Timeout,
    /// The agent's trust level is below the tool's requirement.
    InsufficientTrust {
        /// Trust the tool requires.
        required: TrustLevel,
        /// Trust the agent holds.
        actual: TrustLevel,
    },
}

/// The governor's verdict on one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The call may execute.
    Admitted(AdmitMode),
    /// The call must not execute; the reason is fed back to the agent.
    Rejected(RejectReason),
}

impl Decision {
    /// Whether the call may proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted(_))
    }
}

/// Where approval requests go to be answered. Implemented by the UI layer;
/// tests use channel-backed implementations.
#[async_trait]
pub trait ApprovalPrompter: Send + Sync {
    /// Present the request and wait for the user's answer. The governor
    /// enforces the prompt timeout around this call.
    async fn prompt(&self, request: ApprovalRequest) -> ApprovalResponse;
}

/// The result of one agent interaction, consumed by the trust governor.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    /// The agent that acted.
    pub agent_id: AgentId,
    /// Capability domain the interaction belongs to.
    pub domain: String,
    /// Whether the interaction succeeded.
    pub success: bool,
    /// Whether the user had to correct the result.
    pub correction: bool,
}

impl InteractionOutcome {
    /// A successful, uncorrected interaction.
    pub fn success(agent_id: AgentId, domain: impl Into<String>) -> Self {
        Self {
            agent_id,
            domain: domain.into(),
            success: true,
            correction: false,
        }
    }

    /// A failed or corrected interaction.
    pub fn corrected(agent_id: AgentId, domain: impl Into<String>) -> Self {
        Self {
            agent_id,
            domain: domain.into(),
            success: false,
            correction: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_is_admitted() {
        assert!(Decision::Admitted(AdmitMode::BelowThreshold).is_admitted());
        assert!(!Decision::Rejected(RejectReason::UserDenied).is_admitted());
    }

    #[test]
    fn reject_reason_serde_tagged() {
        let r = RejectReason::InsufficientTrust {
            required: TrustLevel::Trusted,
            actual: TrustLevel::Assistant,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["reason"], "insufficient_trust");
        let back: RejectReason = serde_json::from_value(json).unwrap();
        assert_eq!(r, back);
    }
}
