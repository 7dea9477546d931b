//! Completion request and usage types
//!
//! The gateway never performs the completion itself; it only inspects the
//! request before the call and the reported usage after it.

use crate::message::Message;
use crate::registry::Capability;
use crate::tools::ToolDefinition;
use serde::{Deserialize, Serialize};

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Build usage from prompt and completion counts
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Completion request as seen by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Explicit model id; `None` lets the router decide
    #[serde(default)]
    pub model: Option<String>,
    /// Messages in the conversation
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Tools offered to the model
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Capabilities any serving model must have
    #[serde(default)]
    pub required_capabilities: Vec<Capability>,
}

impl CompletionRequest {
    /// Create a request without an explicit model
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the request to a model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add a message
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add messages
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Add tools
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Require a capability from the serving model
    #[must_use]
    pub fn requiring(mut self, capability: Capability) -> Self {
        if !self.required_capabilities.contains(&capability) {
            self.required_capabilities.push(capability);
        }
        self
    }

    /// Capabilities implied by the request shape plus the explicit ones
    ///
    /// Offering tools implies `function_calling`; everything needs `chat`.
    #[must_use]
    pub fn effective_capabilities(&self) -> Vec<Capability> {
        let mut caps = self.required_capabilities.clone();
        if !caps.contains(&Capability::Chat) && !caps.contains(&Capability::Embedding) {
            caps.push(Capability::Chat);
        }
        if !self.tools.is_empty() && !caps.contains(&Capability::FunctionCalling) {
            caps.push(Capability::FunctionCalling);
        }
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(TokenUsage::new(u32::MAX, 1).total_tokens, u32::MAX);
    }

    #[test]
    fn test_effective_capabilities() {
        let plain = CompletionRequest::new().with_message(Message::user("hi"));
        assert_eq!(plain.effective_capabilities(), vec![Capability::Chat]);

        let with_tools = plain.clone().with_tools(vec![ToolDefinition::new(
            "search",
            "Search the web",
            serde_json::json!({"type": "object"}),
        )]);
        let caps = with_tools.effective_capabilities();
        assert!(caps.contains(&Capability::Chat));
        assert!(caps.contains(&Capability::FunctionCalling));
    }

    #[test]
    fn test_request_deserialize_defaults() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap();
        assert!(req.model.is_none());
        assert_eq!(req.messages.len(), 1);
        assert!(req.tools.is_empty());
    }
}
