#![deny(missing_docs)]
//! Tool registry for aviary.
//!
//! Holds [`Tool`] implementations as `Arc<dyn Tool>` keyed by name with a
//! unique-name invariant, and runs invocations under schema validation,
//! the per-tool timeout, and the turn's cancellation token. Approval is
//! not this crate's concern — the loop consults the governor before
//! calling [`ToolRegistry::invoke`].

use aviary_core::{
    DurationMs, InputSchema, Tool, ToolContext, ToolError, ToolFailureKind, ToolOutput, ToolSchema,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry of the tools available to an agent's turns.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    default_timeout: DurationMs,
}

impl ToolRegistry {
    /// Create an empty registry with the default 60s execution timeout.
    pub fn new() -> Self {
        Self::with_timeout(DurationMs::from_secs(60))
    }

    /// Create an empty registry with a specific default timeout.
    pub fn with_timeout(default_timeout: DurationMs) -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout,
        }
    }

    /// Register a tool. Names are unique; a second registration under the
    /// same name is rejected rather than silently replacing the first.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Iterate over all registered tools.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas of every registered tool, for the provider request.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Validate an input against a tool's declared schema without
    /// executing it.
    pub fn validate(&self, name: &str, input: &serde_json::Value) -> Result<(), ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.input_schema()
            .validate(input)
            .map_err(ToolError::InvalidInput)
    }

    /// Execute one invocation: validate, then run under the tool's
    /// timeout and the context's cancellation token. Every failure mode
    /// comes back as a [`ToolOutput::Failure`] — callers feed it to the
    /// model as a tool result.
    pub async fn invoke(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutput::failure(
                ToolFailureKind::ExecutionFailed,
                format!("no such tool: {name}"),
            );
        };

        if let Err(message) = tool.input_schema().validate(&input) {
            debug!(tool = name, %message, "input failed schema validation");
            return ToolOutput::failure(ToolFailureKind::InvalidInput, message);
        }

        let timeout = tool.timeout().unwrap_or(self.default_timeout);
        let started = std::time::Instant::now();
        let output = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                warn!(tool = name, "tool cancelled before completion");
                ToolOutput::failure(ToolFailureKind::Cancelled, "turn cancelled")
            }
            result = tokio::time::timeout(timeout.to_std(), tool.execute(input, ctx)) => {
                match result {
                    Ok(output) => output,
                    Err(_) => {
                        warn!(tool = name, timeout = %timeout, "tool timed out");
                        ToolOutput::failure(
                            ToolFailureKind::Timeout,
                            format!("exceeded {timeout}"),
                        )
                    }
                }
            }
        };
        debug!(
            tool = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            failed = output.is_failure(),
            "tool finished"
        );
        output
    }

    /// The full schema subset a tool declared, by name.
    pub fn schema_of(&self, name: &str) -> Option<InputSchema> {
        self.tools.get(name).map(|t| t.input_schema())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
