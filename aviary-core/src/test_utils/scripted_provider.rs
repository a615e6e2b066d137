//! ScriptedProvider — replays queued completion scripts.

use crate::error::ProviderError;
use crate::provider::{CompletionRequest, LlmEvent, LlmStream, Provider, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One scripted answer to a `complete` call.
#[derive(Debug, Clone)]
pub enum ScriptedCall {
    /// Yield these events as the stream.
    Events(Vec<LlmEvent>),
    /// Fail before a stream exists.
    Fail(ProviderError),
}

/// A provider that replays a queue of scripted calls in order. Panics if
/// called more times than it has scripts — a scripting bug in the test.
pub struct ScriptedProvider {
    calls: Mutex<VecDeque<ScriptedCall>>,
    completions: AtomicUsize,
}

impl ScriptedProvider {
    /// Create a provider from scripted calls.
    pub fn new(calls: impl IntoIterator<Item = ScriptedCall>) -> Self {
        Self {
            calls: Mutex::new(calls.into_iter().collect()),
            completions: AtomicUsize::new(0),
        }
    }

    /// How many times `complete` has been called.
    pub fn calls_made(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<LlmStream, ProviderError> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        let call = self
            .calls
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: no more scripted calls");
        match call {
            ScriptedCall::Events(events) => Ok(Box::pin(futures::stream::iter(events))),
            ScriptedCall::Fail(err) => Err(err),
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Script a plain text completion: one `Text`, usage, `Done`.
pub fn script_text(text: impl Into<String>) -> ScriptedCall {
    ScriptedCall::Events(vec![
        LlmEvent::Text(text.into()),
        LlmEvent::Usage(TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            cost: None,
        }),
        LlmEvent::Done,
    ])
}

/// Script a completion that requests one tool call.
pub fn script_tool_call(
    id: impl Into<String>,
    name: impl Into<String>,
    input: serde_json::Value,
) -> ScriptedCall {
    ScriptedCall::Events(vec![
        LlmEvent::ToolCall {
            id: id.into(),
            name: name.into(),
            input,
        },
        LlmEvent::Usage(TokenUsage {
            input_tokens: 10,
            output_tokens: 15,
            cost: None,
        }),
        LlmEvent::Done,
    ])
}
