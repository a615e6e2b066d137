//! Context compaction strategies for the turn transcript.

use aviary_core::{ChatMessage, MessagePart};

/// Strategy for keeping the transcript inside the context window.
/// Invoked between rounds and when the provider reports the context
/// length exceeded.
pub trait CompactionStrategy: Send + Sync {
    /// Estimate token count for a transcript.
    fn token_estimate(&self, messages: &[ChatMessage]) -> usize;

    /// Whether compaction should run given the transcript and limit.
    fn should_compact(&self, messages: &[ChatMessage], limit: usize) -> bool;

    /// Compact the transcript. Returns a shorter list.
    fn compact(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage>;
}

fn part_chars(part: &MessagePart) -> usize {
    match part {
        MessagePart::Text { text } => text.len(),
        MessagePart::ToolUse { input, .. } => input.to_string().len(),
        MessagePart::ToolResult { content, .. } => content.len(),
        _ => 0,
    }
}

fn estimate_message(msg: &ChatMessage, chars_per_token: usize) -> usize {
    msg.parts
        .iter()
        .map(|p| part_chars(p) / chars_per_token)
        .sum::<usize>()
        + 4 // per-message overhead (role, framing)
}

/// Never compacts. For short turns, or providers that truncate natively.
pub struct NoCompaction;

impl CompactionStrategy for NoCompaction {
    fn token_estimate(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| estimate_message(m, 4)).sum()
    }

    fn should_compact(&self, _messages: &[ChatMessage], _limit: usize) -> bool {
        false
    }

    fn compact(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        messages
    }
}

/// Drops oldest messages past the limit, keeping the first message (the
/// triggering input) and the most recent context.
pub struct SlidingWindow {
    chars_per_token: usize,
}

impl SlidingWindow {
    /// Create with the default 4-chars-per-token estimate.
    pub fn new() -> Self {
        Self { chars_per_token: 4 }
    }

    /// Override the chars-per-token ratio.
    pub fn with_ratio(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl CompactionStrategy for SlidingWindow {
    fn token_estimate(&self, messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .map(|m| estimate_message(m, self.chars_per_token))
            .sum()
    }

    fn should_compact(&self, messages: &[ChatMessage], limit: usize) -> bool {
        self.token_estimate(messages) > limit
    }

    fn compact(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        if messages.len() <= 2 {
            return messages;
        }

        // Keep the first message, then work backwards keeping recent
        // messages until roughly half the original estimate is reached.
        let total = self.token_estimate(&messages);
        let target = total / 2;
        let first = messages[0].clone();
        let mut current = estimate_message(&first, self.chars_per_token);

        let mut kept = Vec::new();
        for msg in messages[1..].iter().rev() {
            let cost = estimate_message(msg, self.chars_per_token);
            if current + cost > target && !kept.is_empty() {
                break;
            }
            kept.push(msg.clone());
            current += cost;
        }
        kept.reverse();

        let mut result = vec![first];
        result.extend(kept);
        result
    }
}
