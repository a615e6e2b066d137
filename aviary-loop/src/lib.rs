#![deny(missing_docs)]
//! Turn engine for aviary.
//!
//! One turn: an input transcript plus the agent's tools produces assistant
//! text and tool calls, which are gated by the governor, executed, and fed
//! back, bounded by a round limit. Provider failures are classified and
//! retried within explicit budgets; cancellation is observable at every
//! suspension point; denials travel back to the model as tool results.

mod compaction;
mod observer;
mod router;

pub use compaction::{CompactionStrategy, NoCompaction, SlidingWindow};
pub use observer::{TurnEvent, TurnObserver};
pub use router::{Capability, LatencyClass, Locality, ProviderEntry, ProviderRouter, RouteQuery};

use aviary_core::{
    AgentIdentity, ChatMessage, CompletionRequest, DurationMs, LlmEvent, MessagePart, Provider,
    ProviderError, RejectReason, RiskLevel, TokenUsage, Tool, ToolCallId, ToolContext,
    ToolFailureKind, ToolOutput, TurnError, WorkspaceId,
};
use aviary_governor::Governor;
use aviary_tool::ToolRegistry;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bounded retry budgets, per provider call.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const MAX_NETWORK_RETRIES: u32 = 3;
const RATE_LIMIT_DELAY_CAP: Duration = Duration::from_secs(60);
const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

/// Static configuration for a turn engine instance.
#[derive(Debug, Clone)]
pub struct TurnEngineConfig {
    /// Upper bound on rounds within one turn.
    pub max_rounds: u32,
    /// Model override (None = provider default).
    pub model: Option<String>,
    /// System prompt for every round.
    pub system_prompt: Option<String>,
    /// Output token cap per round.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Ask providers for streaming deltas.
    pub stream: bool,
    /// Round-trip cap for non-streaming calls.
    pub provider_timeout: DurationMs,
}

impl Default for TurnEngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: 16,
            model: None,
            system_prompt: None,
            max_tokens: Some(4096),
            temperature: None,
            stream: true,
            provider_timeout: DurationMs::from_secs(120),
        }
    }
}

/// Input to one turn.
pub struct TurnRequest {
    /// The transcript so far, ending with the triggering input.
    pub messages: Vec<ChatMessage>,
    /// Workspace the turn acts against, if any.
    pub workspace: Option<WorkspaceId>,
    /// Cancellation for the whole turn; propagates into tools.
    pub cancel: CancellationToken,
    /// Progress stream for the UI layer.
    pub observer: TurnObserver,
}

impl TurnRequest {
    /// A request with no workspace, a fresh token, and no observer.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            workspace: None,
            cancel: CancellationToken::new(),
            observer: TurnObserver::disabled(),
        }
    }
}

/// Why the turn ended. Failures are `Err` from [`TurnEngine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnExit {
    /// The model produced a final response.
    Completed,
    /// The round bound was hit.
    Truncated,
    /// The cancellation token fired.
    Cancelled,
}

/// Record of one tool call made during a turn.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    /// The provider-assigned call id.
    pub call: ToolCallId,
    /// Tool name.
    pub name: String,
    /// Whether the governor admitted it.
    pub admitted: bool,
    /// Whether the invocation failed (including rejection).
    pub failed: bool,
}

/// Output of one turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The transcript including everything this turn appended.
    pub transcript: Vec<ChatMessage>,
    /// Assistant text segments in emission order.
    pub segments: Vec<String>,
    /// Why the turn ended.
    pub exit: TurnExit,
    /// Aggregated usage across rounds.
    pub usage: TokenUsage,
    /// Rounds executed (≤ `max_rounds`).
    pub rounds: u32,
    /// Every tool call proposed this turn.
    pub tools_called: Vec<ToolCallRecord>,
}

#[derive(Default)]
struct RoundOutcome {
    segments: Vec<String>,
    calls: Vec<PendingCall>,
    usage: TokenUsage,
}

struct PendingCall {
    id: String,
    name: String,
    input: serde_json::Value,
}

enum RoundResult {
    Done(RoundOutcome),
    Cancelled,
}

enum Gated {
    Run,
    Feedback(ToolOutput),
}

/// The bounded, tool-calling loop that drives a provider through
/// message/tool rounds for one agent.
pub struct TurnEngine {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    governor: Arc<Governor>,
    compaction: Box<dyn CompactionStrategy>,
    config: TurnEngineConfig,
}

impl TurnEngine {
    /// Create an engine with default config and no compaction.
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, governor: Arc<Governor>) -> Self {
        Self {
            provider,
            tools,
            governor,
            compaction: Box::new(NoCompaction),
            config: TurnEngineConfig::default(),
        }
    }

    /// Replace the engine configuration.
    pub fn with_config(mut self, config: TurnEngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the compaction strategy.
    pub fn with_compaction(mut self, compaction: Box<dyn CompactionStrategy>) -> Self {
        self.compaction = compaction;
        self
    }

    /// Drive one turn to completion, truncation, cancellation, or failure.
    pub async fn run(
        &self,
        agent: &AgentIdentity,
        request: TurnRequest,
    ) -> Result<TurnOutcome, TurnError> {
        let TurnRequest {
            mut messages,
            workspace,
            cancel,
            observer,
        } = request;

        let mut usage = TokenUsage::default();
        let mut segments: Vec<String> = Vec::new();
        let mut tools_called: Vec<ToolCallRecord> = Vec::new();
        let mut rounds: u32 = 0;

        let exit = loop {
            if rounds >= self.config.max_rounds {
                break TurnExit::Truncated;
            }
            if cancel.is_cancelled() {
                break TurnExit::Cancelled;
            }
            rounds += 1;

            let round = match self
                .round_with_retries(&mut messages, &observer, &cancel)
                .await
            {
                Ok(RoundResult::Done(round)) => round,
                Ok(RoundResult::Cancelled) => break TurnExit::Cancelled,
                Err(err) => {
                    observer.emit(TurnEvent::Errored {
                        message: err.to_string(),
                    });
                    return Err(err);
                }
            };

            usage.absorb(&round.usage);
            segments.extend(round.segments.iter().cloned());

            if round.calls.is_empty() {
                if !round.segments.is_empty() {
                    messages.push(assistant_message(&round));
                }
                break TurnExit::Completed;
            }

            messages.push(assistant_message(&round));
            match self
                .execute_calls(
                    agent,
                    round.calls,
                    workspace.as_ref(),
                    &cancel,
                    &observer,
                    &mut tools_called,
                )
                .await
            {
                Some(result_parts) => messages.push(ChatMessage::tool_results(result_parts)),
                None => break TurnExit::Cancelled,
            }

            let limit = self.config.max_tokens.unwrap_or(4096) as usize * 4;
            if self.compaction.should_compact(&messages, limit) {
                debug!(messages = messages.len(), "compacting transcript");
                messages = self.compaction.compact(messages);
            }
        };

        observer.emit(match exit {
            TurnExit::Completed => TurnEvent::Completed,
            TurnExit::Truncated => TurnEvent::Truncated,
            TurnExit::Cancelled => TurnEvent::Cancelled,
        });

        Ok(TurnOutcome {
            transcript: messages,
            segments,
            exit,
            usage,
            rounds,
            tools_called,
        })
    }

    fn build_request(&self, messages: &[ChatMessage]) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            tools: self.tools.schemas(),
            temperature: self.config.temperature,
            top_p: None,
            max_tokens: self.config.max_tokens,
            stop_sequences: Vec::new(),
            stream: self.config.stream,
            system: self.config.system_prompt.clone(),
        }
    }

    /// One provider round under the error classification table:
    /// rate limits sleep `retry_after` (capped) up to 3 retries; network
    /// errors back off 2s/4s/8s up to 3 retries; context overflow gets one
    /// compaction pass; auth and request errors surface immediately.
    async fn round_with_retries(
        &self,
        messages: &mut Vec<ChatMessage>,
        observer: &TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<RoundResult, TurnError> {
        let mut rate_retries: u32 = 0;
        let mut net_retries: u32 = 0;
        let mut compacted = false;

        loop {
            let request = self.build_request(messages);
            let attempt = self.attempt_round(request, observer, cancel);
            let result = if self.config.stream {
                attempt.await
            } else {
                match tokio::time::timeout(self.config.provider_timeout.to_std(), attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::NetworkError(
                        "provider round-trip timed out".into(),
                    )),
                }
            };

            match result {
                Ok(round) => return Ok(round),
                Err(ProviderError::RateLimited { retry_after })
                    if rate_retries < MAX_RATE_LIMIT_RETRIES =>
                {
                    rate_retries += 1;
                    let delay = retry_after
                        .map(|d| d.to_std())
                        .unwrap_or(DEFAULT_RATE_LIMIT_DELAY)
                        .min(RATE_LIMIT_DELAY_CAP);
                    warn!(attempt = rate_retries, delay_ms = delay.as_millis() as u64, "rate limited");
                    tokio::time::sleep(delay).await;
                }
                Err(ProviderError::NetworkError(detail)) if net_retries < MAX_NETWORK_RETRIES => {
                    let delay = Duration::from_secs(2u64 << net_retries);
                    net_retries += 1;
                    warn!(attempt = net_retries, %detail, delay_ms = delay.as_millis() as u64, "network error");
                    tokio::time::sleep(delay).await;
                }
                Err(ProviderError::ContextLengthExceeded) if !compacted => {
                    compacted = true;
                    let before = self.compaction.token_estimate(messages);
                    *messages = self.compaction.compact(std::mem::take(messages));
                    let after = self.compaction.token_estimate(messages);
                    if after >= before {
                        return Err(TurnError::Compaction(
                            "strategy could not shrink the transcript".into(),
                        ));
                    }
                    debug!(before, after, "compacted after context overflow");
                }
                Err(err) => return Err(TurnError::Provider(err)),
            }
        }
    }

    /// Consume one completion stream. Cancellation drains the remaining
    /// events without acting on them.
    async fn attempt_round(
        &self,
        request: CompletionRequest,
        observer: &TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<RoundResult, ProviderError> {
        let mut stream = self.provider.complete(request).await?;
        let mut outcome = RoundOutcome::default();
        let mut delta_buffer = String::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    while stream.next().await.is_some() {}
                    return Ok(RoundResult::Cancelled);
                }
                item = stream.next() => item,
            };
            let Some(event) = next else {
                break;
            };
            match event {
                LlmEvent::TextDelta(delta) => {
                    observer.emit(TurnEvent::TextDelta(delta.clone()));
                    delta_buffer.push_str(&delta);
                }
                LlmEvent::Text(text) => {
                    observer.emit(TurnEvent::Segment(text.clone()));
                    outcome.segments.push(text);
                }
                LlmEvent::ToolCall { id, name, input } => {
                    outcome.calls.push(PendingCall { id, name, input });
                }
                LlmEvent::Usage(delta) => {
                    observer.emit(TurnEvent::Usage(delta.clone()));
                    outcome.usage.absorb(&delta);
                }
                LlmEvent::Done => break,
                LlmEvent::Error(err) => return Err(err),
                _ => {}
            }
        }

        if !delta_buffer.is_empty() {
            observer.emit(TurnEvent::Segment(delta_buffer.clone()));
            outcome.segments.push(delta_buffer);
        }
        Ok(RoundResult::Done(outcome))
    }

    /// Gate and execute one round's pending calls. Execution is parallel
    /// only when every call is `risk ≤ low` with no write intent;
    /// otherwise calls run in provider-emitted order. Returns `None` when
    /// cancellation dropped not-yet-started calls.
    async fn execute_calls(
        &self,
        agent: &AgentIdentity,
        calls: Vec<PendingCall>,
        workspace: Option<&WorkspaceId>,
        cancel: &CancellationToken,
        observer: &TurnObserver,
        records: &mut Vec<ToolCallRecord>,
    ) -> Option<Vec<MessagePart>> {
        let parallel_ok = calls.iter().all(|call| {
            self.tools
                .get(&call.name)
                .is_some_and(|t| t.risk_level() <= RiskLevel::Low && !t.write_intent())
        });

        let ctx_for = |cancel: &CancellationToken| ToolContext {
            agent: agent.id.clone(),
            workspace: workspace.cloned(),
            cancel: cancel.child_token(),
        };

        if parallel_ok {
            // Admission stays in emitted order; execution overlaps.
            let mut slots: Vec<(PendingCall, Option<ToolOutput>)> = Vec::with_capacity(calls.len());
            for call in calls {
                if cancel.is_cancelled() {
                    return None;
                }
                match self.gate(agent, &call, observer).await {
                    Gated::Run => slots.push((call, None)),
                    Gated::Feedback(output) => slots.push((call, Some(output))),
                }
            }

            let ctx = ctx_for(cancel);
            let executions = slots.iter().map(|(call, feedback)| async {
                match feedback {
                    Some(output) => output.clone(),
                    None => self.tools.invoke(&call.name, call.input.clone(), &ctx).await,
                }
            });
            let outputs: Vec<ToolOutput> = futures::future::join_all(executions).await;

            let mut parts = Vec::with_capacity(slots.len());
            for ((call, feedback), output) in slots.iter().zip(outputs) {
                self.finish_call(call, feedback.is_none(), &output, observer, records);
                parts.push(result_part(call, &output));
            }
            return Some(parts);
        }

        // Sequential: admit → execute per call, deterministic audit order.
        let mut parts = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                return None;
            }
            let (admitted, output) = match self.gate(agent, &call, observer).await {
                Gated::Run => {
                    let ctx = ctx_for(cancel);
                    let output = self.tools.invoke(&call.name, call.input.clone(), &ctx).await;
                    (true, output)
                }
                Gated::Feedback(output) => (false, output),
            };
            self.finish_call(&call, admitted, &output, observer, records);
            parts.push(result_part(&call, &output));
        }
        Some(parts)
    }

    fn finish_call(
        &self,
        call: &PendingCall,
        admitted: bool,
        output: &ToolOutput,
        observer: &TurnObserver,
        records: &mut Vec<ToolCallRecord>,
    ) {
        observer.emit(TurnEvent::ToolResult {
            call: ToolCallId::new(call.id.clone()),
            output: output.clone(),
        });
        records.push(ToolCallRecord {
            call: ToolCallId::new(call.id.clone()),
            name: call.name.clone(),
            admitted,
            failed: output.is_failure(),
        });
    }

    /// Validation and admission for one call. Anything that stops the
    /// call from running comes back as feedback for the model.
    async fn gate(
        &self,
        agent: &AgentIdentity,
        call: &PendingCall,
        observer: &TurnObserver,
    ) -> Gated {
        let call_id = ToolCallId::new(call.id.clone());
        observer.emit(TurnEvent::ToolPending {
            call: call_id.clone(),
            name: call.name.clone(),
        });

        let Some(tool) = self.tools.get(&call.name) else {
            return Gated::Feedback(ToolOutput::failure(
                ToolFailureKind::ExecutionFailed,
                format!("no such tool: {}", call.name),
            ));
        };

        if let Err(message) = tool.input_schema().validate(&call.input) {
            return Gated::Feedback(ToolOutput::failure(ToolFailureKind::InvalidInput, message));
        }

        let decision = self
            .governor
            .admit(agent, tool.as_ref(), &call_id, &call.input)
            .await;
        observer.emit(TurnEvent::ToolDecision {
            call: call_id,
            decision: decision.clone(),
        });

        match decision {
            aviary_core::Decision::Admitted(_) => Gated::Run,
            aviary_core::Decision::Rejected(reason) => {
                let message = reject_message(&reason);
                Gated::Feedback(ToolOutput::failure(
                    ToolFailureKind::Rejected(reason),
                    message,
                ))
            }
        }
    }
}

fn assistant_message(round: &RoundOutcome) -> ChatMessage {
    let mut parts: Vec<MessagePart> = round
        .segments
        .iter()
        .map(|text| MessagePart::Text { text: text.clone() })
        .collect();
    parts.extend(round.calls.iter().map(|call| MessagePart::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: call.input.clone(),
    }));
    ChatMessage::assistant_parts(parts)
}

fn result_part(call: &PendingCall, output: &ToolOutput) -> MessagePart {
    MessagePart::ToolResult {
        tool_use_id: call.id.clone(),
        content: output.to_result_content(),
        is_error: output.is_failure(),
    }
}

fn reject_message(reason: &RejectReason) -> String {
    match reason {
        RejectReason::PolicyForbidden => "this tool is forbidden by policy".into(),
        RejectReason::UserDenied => "the user denied this action".into(),
        RejectReason::Timeout => "approval timed out".into(),
        RejectReason::InsufficientTrust { required, actual } => {
            format!("requires {required:?} trust, agent has {actual:?}")
        }
        _ => "rejected".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aviary_core::test_utils::{script_text, script_tool_call, ScriptedCall, ScriptedProvider, StaticTool};
    use aviary_core::{
        AgentProfile, ApprovalPrompter, ApprovalRequest, ApprovalResponse, Decision, TrustLevel,
    };
    use aviary_governor::PolicySet;
    use async_trait::async_trait;
    use serde_json::json;

    struct AutoPrompter(ApprovalResponse);

    #[async_trait]
    impl ApprovalPrompter for AutoPrompter {
        async fn prompt(&self, _request: ApprovalRequest) -> ApprovalResponse {
            self.0
        }
    }

    fn agent() -> AgentIdentity {
        let mut a = AgentIdentity::new("tester", AgentProfile::Concierge);
        a.trust = TrustLevel::Trusted;
        a
    }

    fn governor(response: ApprovalResponse) -> Arc<Governor> {
        Arc::new(Governor::new(
            PolicySet::default(),
            Arc::new(AutoPrompter(response)),
        ))
    }

    fn engine_with(
        calls: Vec<ScriptedCall>,
        tools: ToolRegistry,
        response: ApprovalResponse,
    ) -> (TurnEngine, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(calls));
        let engine = TurnEngine::new(provider.clone(), Arc::new(tools), governor(response));
        (engine, provider)
    }

    fn request(text: &str) -> TurnRequest {
        TurnRequest::new(vec![ChatMessage::user(text)])
    }

    #[tokio::test]
    async fn simple_completion() {
        let (engine, _) = engine_with(
            vec![script_text("Hello!")],
            ToolRegistry::new(),
            ApprovalResponse::Deny,
        );
        let outcome = engine.run(&agent(), request("Hi")).await.unwrap();
        assert_eq!(outcome.exit, TurnExit::Completed);
        assert_eq!(outcome.segments, vec!["Hello!"]);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.usage.input_tokens, 10);
        assert_eq!(outcome.usage.output_tokens, 5);
        assert!(outcome.tools_called.is_empty());
    }

    #[tokio::test]
    async fn streaming_deltas_aggregate_into_one_segment() {
        let (engine, _) = engine_with(
            vec![ScriptedCall::Events(vec![
                LlmEvent::TextDelta("Hel".into()),
                LlmEvent::TextDelta("lo".into()),
                LlmEvent::Done,
            ])],
            ToolRegistry::new(),
            ApprovalResponse::Deny,
        );
        let (observer, mut rx) = TurnObserver::channel();
        let mut req = request("Hi");
        req.observer = observer;

        let outcome = engine.run(&agent(), req).await.unwrap();
        assert_eq!(outcome.segments, vec!["Hello"]);

        let mut deltas = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, TurnEvent::TextDelta(_)) {
                deltas += 1;
            }
        }
        assert_eq!(deltas, 2);
    }

    #[tokio::test]
    async fn tool_call_executes_and_feeds_back() {
        let mut tools = ToolRegistry::new();
        let tool = Arc::new(StaticTool::new("lookup", json!({"found": true})));
        tools.register(tool.clone()).unwrap();

        let (engine, provider) = engine_with(
            vec![
                script_tool_call("tc_1", "lookup", json!({})),
                script_text("Done."),
            ],
            tools,
            ApprovalResponse::Deny,
        );

        let outcome = engine.run(&agent(), request("look it up")).await.unwrap();
        assert_eq!(outcome.exit, TurnExit::Completed);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(tool.calls_made(), 1);
        assert_eq!(provider.calls_made(), 2);
        assert_eq!(outcome.tools_called.len(), 1);
        assert!(outcome.tools_called[0].admitted);
        assert!(!outcome.tools_called[0].failed);

        // The transcript carries the tool result back to the model.
        let result_part = outcome
            .transcript
            .iter()
            .flat_map(|m| &m.parts)
            .find_map(|p| match p {
                MessagePart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some((tool_use_id.clone(), content.clone(), *is_error)),
                _ => None,
            })
            .expect("tool result in transcript");
        assert_eq!(result_part.0, "tc_1");
        assert!(result_part.1.contains("found"));
        assert!(!result_part.2);
    }

    #[tokio::test]
    async fn rejected_tool_is_not_executed_and_surfaces_in_conversation() {
        let mut tools = ToolRegistry::new();
        let tool = Arc::new(
            StaticTool::new("delete_file", json!(null)).with_risk(RiskLevel::Critical),
        );
        tools.register(tool.clone()).unwrap();

        let (engine, _) = engine_with(
            vec![
                script_tool_call("tc_1", "delete_file", json!({"path": "x"})),
                script_text("Understood, I won't."),
            ],
            tools,
            ApprovalResponse::Deny,
        );

        let (observer, mut rx) = TurnObserver::channel();
        let mut req = request("delete x");
        req.observer = observer;
        let outcome = engine.run(&agent(), req).await.unwrap();

        assert_eq!(outcome.exit, TurnExit::Completed);
        assert_eq!(tool.calls_made(), 0);
        assert!(outcome.tools_called[0].failed);
        assert!(!outcome.tools_called[0].admitted);

        let mut saw_rejection = false;
        while let Ok(event) = rx.try_recv() {
            if let TurnEvent::ToolDecision {
                decision: Decision::Rejected(_),
                ..
            } = event
            {
                saw_rejection = true;
            }
        }
        assert!(saw_rejection);

        // The rejection is a tool result, not an error.
        let rejected = outcome
            .transcript
            .iter()
            .flat_map(|m| &m.parts)
            .any(|p| matches!(p, MessagePart::ToolResult { is_error: true, content, .. } if content.contains("denied")));
        assert!(rejected);
    }

    #[tokio::test]
    async fn insufficient_trust_is_feedback_not_exit() {
        let mut tools = ToolRegistry::new();
        tools
            .register(Arc::new(
                StaticTool::new("publish", json!(null))
                    .with_risk(RiskLevel::Low)
                    .with_required_trust(TrustLevel::Autonomous),
            ))
            .unwrap();

        let (engine, _) = engine_with(
            vec![
                script_tool_call("tc_1", "publish", json!({})),
                script_text("I lack the trust for that."),
            ],
            tools,
            ApprovalResponse::Approve,
        );

        let outcome = engine.run(&agent(), request("publish")).await.unwrap();
        assert_eq!(outcome.exit, TurnExit::Completed);
        assert_eq!(outcome.rounds, 2);
    }

    #[tokio::test]
    async fn round_bound_truncates() {
        let mut tools = ToolRegistry::new();
        tools
            .register(Arc::new(StaticTool::new("spin", json!(1))))
            .unwrap();

        let (engine, _) = engine_with(
            vec![
                script_tool_call("tc_1", "spin", json!({})),
                script_tool_call("tc_2", "spin", json!({})),
                script_text("never reached"),
            ],
            tools,
            ApprovalResponse::Deny,
        );
        let engine = engine.with_config(TurnEngineConfig {
            max_rounds: 2,
            ..Default::default()
        });

        let outcome = engine.run(&agent(), request("loop")).await.unwrap();
        assert_eq!(outcome.exit, TurnExit::Truncated);
        assert_eq!(outcome.rounds, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_then_succeeds() {
        let retry = Some(DurationMs::from_secs(1));
        let (engine, provider) = engine_with(
            vec![
                ScriptedCall::Fail(ProviderError::RateLimited { retry_after: retry }),
                ScriptedCall::Fail(ProviderError::RateLimited { retry_after: retry }),
                script_text("finally"),
            ],
            ToolRegistry::new(),
            ApprovalResponse::Deny,
        );

        let started = tokio::time::Instant::now();
        let outcome = engine.run(&agent(), request("hi")).await.unwrap();
        assert_eq!(outcome.exit, TurnExit::Completed);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(provider.calls_made(), 3);
        // Two sleeps of the suggested 1s each.
        assert!(started.elapsed() >= Duration::from_secs(2));
        // Usage only from the successful call.
        assert_eq!(outcome.usage.input_tokens, 10);
        assert_eq!(outcome.usage.output_tokens, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_surface_after_retry_budget() {
        let fails: Vec<ScriptedCall> = (0..4)
            .map(|n| ScriptedCall::Fail(ProviderError::NetworkError(format!("reset {n}"))))
            .collect();
        let (engine, provider) = engine_with(fails, ToolRegistry::new(), ApprovalResponse::Deny);

        let err = engine.run(&agent(), request("hi")).await.unwrap_err();
        assert!(matches!(
            err,
            TurnError::Provider(ProviderError::NetworkError(_))
        ));
        assert_eq!(provider.calls_made(), 4);
    }

    #[tokio::test]
    async fn auth_failure_surfaces_immediately() {
        let (engine, provider) = engine_with(
            vec![ScriptedCall::Fail(ProviderError::AuthenticationFailed)],
            ToolRegistry::new(),
            ApprovalResponse::Deny,
        );
        let (observer, mut rx) = TurnObserver::channel();
        let mut req = request("hi");
        req.observer = observer;

        let err = engine.run(&agent(), req).await.unwrap_err();
        assert!(matches!(
            err,
            TurnError::Provider(ProviderError::AuthenticationFailed)
        ));
        assert_eq!(provider.calls_made(), 1);

        let mut saw_errored = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, TurnEvent::Errored { .. }) {
                saw_errored = true;
            }
        }
        assert!(saw_errored);
    }

    #[tokio::test]
    async fn context_overflow_compacts_once_then_succeeds() {
        let (engine, provider) = engine_with(
            vec![
                ScriptedCall::Fail(ProviderError::ContextLengthExceeded),
                script_text("fits now"),
            ],
            ToolRegistry::new(),
            ApprovalResponse::Deny,
        );
        let engine = engine.with_compaction(Box::new(SlidingWindow::new()));

        let messages: Vec<ChatMessage> =
            (0..10).map(|_| ChatMessage::user("x".repeat(400))).collect();
        let outcome = engine
            .run(&agent(), TurnRequest::new(messages))
            .await
            .unwrap();
        assert_eq!(outcome.exit, TurnExit::Completed);
        assert_eq!(provider.calls_made(), 2);
    }

    #[tokio::test]
    async fn context_overflow_without_strategy_surfaces() {
        let (engine, _) = engine_with(
            vec![ScriptedCall::Fail(ProviderError::ContextLengthExceeded)],
            ToolRegistry::new(),
            ApprovalResponse::Deny,
        );
        let err = engine.run(&agent(), request("hi")).await.unwrap_err();
        assert!(matches!(err, TurnError::Compaction(_)));
    }

    #[tokio::test]
    async fn cancellation_mid_tool_produces_cancelled_exit() {
        let mut tools = ToolRegistry::new();
        tools
            .register(Arc::new(
                StaticTool::new("slow", json!(1)).with_delay(DurationMs::from_secs(30)),
            ))
            .unwrap();

        let (engine, _) = engine_with(
            vec![
                script_tool_call("tc_1", "slow", json!({})),
                script_text("never reached"),
            ],
            tools,
            ApprovalResponse::Deny,
        );

        let cancel = CancellationToken::new();
        let mut req = request("work");
        req.cancel = cancel.clone();
        let (observer, mut rx) = TurnObserver::channel();
        req.observer = observer;

        let task = tokio::spawn(async move { engine.run(&agent(), req).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.exit, TurnExit::Cancelled);

        let mut saw_cancelled = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, TurnEvent::Cancelled) {
                saw_cancelled = true;
            }
        }
        assert!(saw_cancelled);
    }

    #[tokio::test]
    async fn parallel_safe_reads_preserve_result_order() {
        let mut tools = ToolRegistry::new();
        let slow = Arc::new(
            StaticTool::new("slow_read", json!("slow"))
                .with_risk(RiskLevel::Low)
                .with_delay(DurationMs::from_millis(50)),
        );
        let fast = Arc::new(StaticTool::new("fast_read", json!("fast")));
        tools.register(slow.clone()).unwrap();
        tools.register(fast.clone()).unwrap();

        let (engine, _) = engine_with(
            vec![
                ScriptedCall::Events(vec![
                    LlmEvent::ToolCall {
                        id: "tc_1".into(),
                        name: "slow_read".into(),
                        input: json!({}),
                    },
                    LlmEvent::ToolCall {
                        id: "tc_2".into(),
                        name: "fast_read".into(),
                        input: json!({}),
                    },
                    LlmEvent::Done,
                ]),
                script_text("both done"),
            ],
            tools,
            ApprovalResponse::Deny,
        );

        let outcome = engine.run(&agent(), request("read twice")).await.unwrap();
        assert_eq!(slow.calls_made(), 1);
        assert_eq!(fast.calls_made(), 1);

        // Results appear in provider-emitted order regardless of timing.
        let order: Vec<String> = outcome
            .transcript
            .iter()
            .flat_map(|m| &m.parts)
            .filter_map(|p| match p {
                MessagePart::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["tc_1", "tc_2"]);
    }

    #[tokio::test]
    async fn admission_is_audited_per_call_id() {
        let mut tools = ToolRegistry::new();
        tools
            .register(Arc::new(StaticTool::new("lookup", json!(1))))
            .unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            script_tool_call("tc_42", "lookup", json!({})),
            script_text("done"),
        ]));
        let gov = governor(ApprovalResponse::Deny);
        let engine = TurnEngine::new(provider, Arc::new(tools), gov.clone());

        engine.run(&agent(), request("go")).await.unwrap();
        let decision = gov.decision_for(&ToolCallId::new("tc_42")).unwrap();
        assert!(decision.is_admitted());
    }

    #[tokio::test]
    async fn invalid_input_feeds_back_without_admission() {
        struct PickyTool;

        #[async_trait]
        impl aviary_core::Tool for PickyTool {
            fn name(&self) -> &str {
                "picky"
            }
            fn description(&self) -> &str {
                "requires a path"
            }
            fn input_schema(&self) -> aviary_core::InputSchema {
                aviary_core::InputSchema::new()
                    .property("path", aviary_core::PropertySchema::string("File path"))
                    .required("path")
            }
            fn risk_level(&self) -> RiskLevel {
                RiskLevel::Safe
            }
            async fn execute(
                &self,
                _input: serde_json::Value,
                _ctx: &ToolContext,
            ) -> ToolOutput {
                ToolOutput::success(json!(null))
            }
        }

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(PickyTool)).unwrap();

        let (engine, _) = engine_with(
            vec![
                script_tool_call("tc_1", "picky", json!({"wrong": 1})),
                script_text("fixed my input"),
            ],
            tools,
            ApprovalResponse::Deny,
        );

        let outcome = engine.run(&agent(), request("go")).await.unwrap();
        assert_eq!(outcome.exit, TurnExit::Completed);
        let invalid = outcome
            .transcript
            .iter()
            .flat_map(|m| &m.parts)
            .any(|p| matches!(p, MessagePart::ToolResult { is_error: true, content, .. } if content.contains("invalid input")));
        assert!(invalid);
    }
}
