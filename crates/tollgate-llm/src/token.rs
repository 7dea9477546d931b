//! Token estimation
//!
//! Heuristic token counts for prompts and tool schemas. No tokenizer is
//! loaded: roughly four characters make one token for the BPE vocabularies
//! modern providers use, which is close enough for admission decisions.
//! Counts are approximate by construction; callers should treat them with
//! the confidence reported by the cost estimator.

use crate::message::Message;
use crate::tools::ToolDefinition;

/// Average characters per token
pub const CHARS_PER_TOKEN: usize = 4;

/// Per-message overhead (role marker + separators)
pub const MESSAGE_OVERHEAD: usize = 6;

/// Per-conversation overhead (start/end tokens)
pub const CONVERSATION_OVERHEAD: usize = 3;

/// Per-tool overhead (schema structure)
pub const TOOL_OVERHEAD: usize = 10;

/// Heuristic token estimator
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    /// Create a new estimator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Count tokens in a string
    ///
    /// Always at least one, and never decreases as text grows.
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN).max(1)
    }

    /// Count tokens in a single message, including role overhead
    #[must_use]
    pub fn count_single_message(&self, message: &Message) -> usize {
        let name = message
            .name
            .as_deref()
            .map(|n| self.count_tokens(n))
            .unwrap_or(0);
        self.count_tokens(&message.content) + name + MESSAGE_OVERHEAD
    }

    /// Count total tokens in a conversation
    #[must_use]
    pub fn count_message_tokens(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.count_single_message(m))
            .sum::<usize>()
            + CONVERSATION_OVERHEAD
    }

    /// Estimate tokens spent describing tools to the model
    #[must_use]
    pub fn count_tool_tokens(&self, tools: &[ToolDefinition]) -> usize {
        tools
            .iter()
            .map(|tool| {
                self.count_tokens(&tool.name)
                    + self.count_tokens(&tool.description)
                    + self.count_tokens(&tool.parameters.to_string())
                    + TOOL_OVERHEAD
            })
            .sum()
    }
}

/// Convenience function to count tokens in text
#[must_use]
pub fn count_tokens(text: &str) -> usize {
    TokenEstimator.count_tokens(text)
}

/// Convenience function to count tokens in messages
#[must_use]
pub fn count_message_tokens(messages: &[Message]) -> usize {
    TokenEstimator.count_message_tokens(messages)
}

/// Convenience function to count tokens in tool schemas
#[must_use]
pub fn count_tool_tokens(tools: &[ToolDefinition]) -> usize {
    TokenEstimator.count_tool_tokens(tools)
}
