//! The provider contract — one completion request in, one lazy event
//! stream out.
//!
//! Providers are stateless adapters over a model backend. Each `complete`
//! call is independent; no in-flight state leaks between calls. The stream
//! terminates with [`LlmEvent::Done`] or [`LlmEvent::Error`]. Streaming and
//! non-streaming backends have identical semantics modulo whether text
//! arrives as [`LlmEvent::TextDelta`]s or one aggregated [`LlmEvent::Text`].

use crate::error::ProviderError;
use crate::tool::InputSchema;
use async_trait::async_trait;
use futures::Stream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// The lazy completion stream. Single-consumer.
pub type LlmStream = Pin<Box<dyn Stream<Item = LlmEvent> + Send>>;

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions.
    System,
    /// Human or tool-result input.
    User,
    /// Model output.
    Assistant,
}

/// One part of a message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// A tool call the model requested.
    ToolUse {
        /// Identifier the result must echo.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input.
        input: serde_json::Value,
    },
    /// Result of an executed (or rejected) tool call.
    ToolResult {
        /// The tool-use id this answers.
        tool_use_id: String,
        /// Result content.
        content: String,
        /// Whether the tool failed or was rejected.
        is_error: bool,
    },
}

/// A conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: Role,
    /// Message parts.
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    /// A plain-text user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// A plain-text assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// An assistant message from raw parts.
    pub fn assistant_parts(parts: Vec<MessagePart>) -> Self {
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    /// A user message carrying tool results.
    pub fn tool_results(parts: Vec<MessagePart>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }
}

/// A tool surfaced to the provider: name, description, input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name.
    pub name: String,
    /// What it does.
    pub description: String,
    /// Declared input schema.
    pub input_schema: InputSchema,
}

/// The recognized completion options. Unsupported fields are ignored by
/// providers; unsupported tool calling yields [`ProviderError::ToolsUnsupported`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (None = provider default).
    pub model: Option<String>,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call.
    pub tools: Vec<ToolSchema>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Nucleus sampling cutoff.
    pub top_p: Option<f64>,
    /// Output token cap.
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    pub stop_sequences: Vec<String>,
    /// Request text as deltas rather than one aggregate.
    pub stream: bool,
    /// System prompt.
    pub system: Option<String>,
}

/// Token usage from one provider call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
    /// Cost in USD, when the provider can compute it.
    pub cost: Option<Decimal>,
}

impl TokenUsage {
    /// Fold another usage record into this one.
    pub fn absorb(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost = match (self.cost, other.cost) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
    }
}

/// One item of the completion stream.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Incremental assistant text (streaming mode).
    TextDelta(String),
    /// A complete assistant text segment (non-streaming mode).
    Text(String),
    /// The model requested a tool call.
    ToolCall {
        /// Identifier the tool result must echo.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input.
        input: serde_json::Value,
    },
    /// Token accounting for this call.
    Usage(TokenUsage),
    /// Normal termination.
    Done,
    /// Abnormal termination.
    Error(ProviderError),
}

/// A model backend. Stateless and shareable across agents.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short name for routing and logs.
    fn name(&self) -> &str;

    /// Issue a completion request. Request-construction failures return
    /// `Err`; mid-stream failures arrive as [`LlmEvent::Error`].
    async fn complete(&self, request: CompletionRequest) -> Result<LlmStream, ProviderError>;

    /// Whether the backend is currently reachable.
    async fn is_available(&self) -> bool;

    /// Models this provider can serve. Optional; defaults to none.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_part_serde_tagged() {
        let part = MessagePart::ToolUse {
            id: "tc_1".into(),
            name: "read_file".into(),
            input: json!({"path": "notes.md"}),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool_use");
        let back: MessagePart = serde_json::from_value(json).unwrap();
        assert_eq!(part, back);
    }

    #[test]
    fn usage_absorb_sums() {
        let mut total = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            cost: Some(Decimal::new(1, 4)),
        };
        total.absorb(&TokenUsage {
            input_tokens: 7,
            output_tokens: 3,
            cost: Some(Decimal::new(2, 4)),
        });
        assert_eq!(total.input_tokens, 17);
        assert_eq!(total.output_tokens, 8);
        assert_eq!(total.cost, Some(Decimal::new(3, 4)));
    }

    #[test]
    fn usage_absorb_keeps_known_cost() {
        let mut total = TokenUsage::default();
        total.absorb(&TokenUsage {
            input_tokens: 1,
            output_tokens: 1,
            cost: Some(Decimal::ONE),
        });
        assert_eq!(total.cost, Some(Decimal::ONE));
        total.absorb(&TokenUsage::default());
        assert_eq!(total.cost, Some(Decimal::ONE));
    }

    #[test]
    fn chat_message_constructors() {
        let m = ChatMessage::user("hi");
        assert_eq!(m.role, Role::User);
        assert_eq!(
            m.parts,
            vec![MessagePart::Text { text: "hi".into() }]
        );
    }
}
