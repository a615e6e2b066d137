//! The tool contract — a named, schema-validated, risk-classified
//! capability invocable by the agent loop under approval policy.

use crate::approval::RejectReason;
use crate::duration::DurationMs;
use crate::id::{AgentId, WorkspaceId};
use crate::value::{RiskLevel, TrustLevel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Primitive types the input schema subset recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON integer.
    Integer,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ValueType {
    fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
        }
    }
}

/// Schema for one named property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// Expected JSON type.
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// What the property means.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Closed set of permitted string values.
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    /// A string property.
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            value_type: ValueType::String,
            description: Some(description.into()),
            enum_values: None,
        }
    }

    /// A property of the given type.
    pub fn of(value_type: ValueType, description: impl Into<String>) -> Self {
        Self {
            value_type,
            description: Some(description.into()),
            enum_values: None,
        }
    }

    /// Restrict a string property to a closed set of values.
    pub fn one_of(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// The JSON-Schema subset tools declare: an object with typed properties
/// and a required list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Named properties.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    /// Names that must be present.
    #[serde(default)]
    pub required: Vec<String>,
}

impl InputSchema {
    /// An empty object schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property.
    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Mark a property required.
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Render as a JSON-Schema object for providers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }

    /// Validate an input value against the schema: object shape, required
    /// presence, property types, and enum membership.
    pub fn validate(&self, input: &serde_json::Value) -> Result<(), String> {
        let Some(obj) = input.as_object() else {
            return Err("input must be an object".into());
        };
        for name in &self.required {
            if !obj.contains_key(name) {
                return Err(format!("missing required property {name:?}"));
            }
        }
        for (name, value) in obj {
            let Some(prop) = self.properties.get(name) else {
                // Unknown properties pass through; future tool versions may
                // recognize them.
                continue;
            };
            if !prop.value_type.accepts(value) {
                return Err(format!(
                    "property {name:?} expects {:?}",
                    prop.value_type
                ));
            }
            if let (Some(allowed), Some(s)) = (&prop.enum_values, value.as_str()) {
                if !allowed.iter().any(|a| a == s) {
                    return Err(format!("property {name:?} must be one of {allowed:?}"));
                }
            }
        }
        Ok(())
    }
}

/// Context handed to an executing tool: who is calling, against which
/// workspace, and the cancellation token to observe.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The calling agent.
    pub agent: AgentId,
    /// The active workspace, if the turn has one.
    pub workspace: Option<WorkspaceId>,
    /// Cooperative cancellation, propagated from the turn.
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Create a context with a fresh, unlinked cancellation token.
    pub fn new(agent: AgentId, workspace: Option<WorkspaceId>) -> Self {
        Self {
            agent,
            workspace,
            cancel: CancellationToken::new(),
        }
    }
}

/// Why a tool invocation failed. Fed back to the model as a tool result,
/// never raised as an exception across the loop boundary.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolFailureKind {
    /// Input failed schema validation.
    InvalidInput,
    /// The executor raised an error.
    ExecutionFailed,
    /// The per-tool timeout elapsed.
    Timeout,
    /// The turn's cancellation token fired.
    Cancelled,
    /// The approval governor refused the call.
    Rejected(RejectReason),
}

/// Outcome of a tool invocation.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolOutput {
    /// The tool ran and produced a value.
    Success {
        /// Executor result.
        value: serde_json::Value,
    },
    /// The tool did not run to completion.
    Failure {
        /// Failure class.
        kind: ToolFailureKind,
        /// Human-readable detail.
        message: String,
    },
}

impl ToolOutput {
    /// A success wrapping the given value.
    pub fn success(value: serde_json::Value) -> Self {
        ToolOutput::Success { value }
    }

    /// A failure of the given kind.
    pub fn failure(kind: ToolFailureKind, message: impl Into<String>) -> Self {
        ToolOutput::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Whether this output is a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, ToolOutput::Failure { .. })
    }

    /// Render for a tool-result message part.
    pub fn to_result_content(&self) -> String {
        match self {
            ToolOutput::Success { value } => value.to_string(),
            ToolOutput::Failure { kind, message } => {
                format!("{}: {message}", failure_label(kind))
            }
        }
    }
}

fn failure_label(kind: &ToolFailureKind) -> &'static str {
    match kind {
        ToolFailureKind::InvalidInput => "invalid input",
        ToolFailureKind::ExecutionFailed => "execution failed",
        ToolFailureKind::Timeout => "timed out",
        ToolFailureKind::Cancelled => "cancelled",
        ToolFailureKind::Rejected(_) => "rejected",
    }
}

/// A named capability. Executors are side-effect-isolated: reads are free,
/// workspace mutations must go through the staging engine — never the
/// filesystem directly.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// What the tool does, for the model.
    fn description(&self) -> &str;

    /// Declared input schema.
    fn input_schema(&self) -> InputSchema;

    /// Risk classification; drives approval.
    fn risk_level(&self) -> RiskLevel;

    /// Minimum trust an agent needs to call this tool.
    fn required_trust(&self) -> TrustLevel {
        TrustLevel::Observer
    }

    /// Whether the tool intends to mutate anything. Gates same-turn
    /// parallel execution.
    fn write_intent(&self) -> bool {
        false
    }

    /// Per-tool execution timeout override (None = runtime default).
    fn timeout(&self) -> Option<DurationMs> {
        None
    }

    /// Execute against a validated input.
    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> ToolOutput;

    /// One-line summary of what this invocation would do, shown in the
    /// approval prompt.
    fn describe_action(&self, input: &serde_json::Value) -> String {
        format!("{} {input}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> InputSchema {
        InputSchema::new()
            .property("path", PropertySchema::string("File path"))
            .property(
                "mode",
                PropertySchema::string("Access mode").one_of(["read", "write"]),
            )
            .property("limit", PropertySchema::of(ValueType::Integer, "Max bytes"))
            .required("path")
    }

    #[test]
    fn validate_accepts_conforming_input() {
        let input = json!({"path": "a.md", "mode": "read", "limit": 10});
        assert!(schema().validate(&input).is_ok());
    }

    #[test]
    fn validate_rejects_missing_required() {
        let err = schema().validate(&json!({"mode": "read"})).unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let err = schema().validate(&json!({"path": 3})).unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn validate_rejects_enum_violation() {
        let err = schema()
            .validate(&json!({"path": "a", "mode": "append"}))
            .unwrap_err();
        assert!(err.contains("mode"));
    }

    #[test]
    fn validate_ignores_unknown_properties() {
        assert!(schema()
            .validate(&json!({"path": "a", "extra": true}))
            .is_ok());
    }

    #[test]
    fn validate_rejects_non_object() {
        assert!(schema().validate(&json!("just a string")).is_err());
    }

    #[test]
    fn schema_to_json_shape() {
        let json = schema().to_json();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["path"]["type"], "string");
        assert_eq!(json["required"][0], "path");
    }

    #[test]
    fn tool_output_result_content() {
        let ok = ToolOutput::success(json!({"n": 1}));
        assert_eq!(ok.to_result_content(), "{\"n\":1}");
        let err = ToolOutput::failure(ToolFailureKind::Timeout, "60s elapsed");
        assert!(err.to_result_content().starts_with("timed out"));
        assert!(err.is_failure());
    }
}
