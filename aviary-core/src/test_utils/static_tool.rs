//! StaticTool — a configurable tool returning a fixed value.

use crate::duration::DurationMs;
use crate::tool::{InputSchema, Tool, ToolContext, ToolOutput};
use crate::value::{RiskLevel, TrustLevel};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A tool that returns a fixed value and records invocation counts.
/// Risk, trust, write intent, and an artificial delay are configurable so
/// governor and loop tests can cover every admission path.
pub struct StaticTool {
    name: String,
    risk: RiskLevel,
    required_trust: TrustLevel,
    write_intent: bool,
    result: serde_json::Value,
    delay: Option<DurationMs>,
    calls: AtomicUsize,
}

impl StaticTool {
    /// A safe, trust-free tool returning the given value.
    pub fn new(name: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            risk: RiskLevel::Safe,
            required_trust: TrustLevel::Observer,
            write_intent: false,
            result,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Set the risk level.
    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    /// Set the required trust level.
    pub fn with_required_trust(mut self, trust: TrustLevel) -> Self {
        self.required_trust = trust;
        self
    }

    /// Declare write intent.
    pub fn with_write_intent(mut self) -> Self {
        self.write_intent = true;
        self
    }

    /// Sleep this long inside `execute` (for timeout/cancel tests).
    pub fn with_delay(mut self, delay: DurationMs) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times the tool ran to completion.
    pub fn calls_made(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed value"
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
    }

    fn risk_level(&self) -> RiskLevel {
        self.risk
    }

    fn required_trust(&self) -> TrustLevel {
        self.required_trust
    }

    fn write_intent(&self) -> bool {
        self.write_intent
    }

    async fn execute(&self, _input: serde_json::Value, ctx: &ToolContext) -> ToolOutput {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay.to_std()) => {}
                _ = ctx.cancel.cancelled() => {
                    return ToolOutput::failure(
                        crate::tool::ToolFailureKind::Cancelled,
                        "cancelled while sleeping",
                    );
                }
            }
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        ToolOutput::success(self.result.clone())
    }
}
