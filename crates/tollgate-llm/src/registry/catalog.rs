//! Model catalog
//!
//! Model metadata and the default catalog seeded into every registry
//! (2026 list prices, USD per 1M tokens).

use super::provider::{Capability, ProviderName};
use serde::{Deserialize, Serialize};

// ============================================================================
// Model Tier
// ============================================================================

/// Model tier for cost/quality trade-offs
///
/// Tiers are ordered by cost (ascending) and quality (ascending):
/// - UltraBudget: < $0.15/M tokens
/// - Fast: $0.15 ~ $1.00/M tokens
/// - Standard: $1.00 ~ $5.00/M tokens
/// - Premium: > $5.00/M tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Ultra-budget models for trivial tasks
    UltraBudget,
    /// Fast, cheap models for simple tasks
    Fast,
    /// Balanced models for general tasks
    Standard,
    /// Premium models for complex reasoning
    Premium,
}

impl ModelTier {
    /// Numeric level for tier comparison (lower = cheaper)
    #[must_use]
    pub fn level(&self) -> u8 {
        match self {
            ModelTier::UltraBudget => 0,
            ModelTier::Fast => 1,
            ModelTier::Standard => 2,
            ModelTier::Premium => 3,
        }
    }

    /// Whether this tier is at least `min`
    #[must_use]
    pub fn at_least(&self, min: ModelTier) -> bool {
        self.level() >= min.level()
    }

    /// Get the price range description for this tier
    #[must_use]
    pub fn price_range(&self) -> &'static str {
        match self {
            ModelTier::UltraBudget => "< $0.15/M tokens",
            ModelTier::Fast => "$0.15 ~ $1.00/M tokens",
            ModelTier::Standard => "$1.00 ~ $5.00/M tokens",
            ModelTier::Premium => "> $5.00/M tokens",
        }
    }
}

impl PartialOrd for ModelTier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModelTier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.level().cmp(&other.level())
    }
}

// ============================================================================
// Model Info
// ============================================================================

fn default_true() -> bool {
    true
}

/// A model in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model id, as sent to the provider
    pub id: String,
    /// Owning provider
    pub provider: ProviderName,
    /// Display name
    pub name: String,
    /// Quality tier
    pub tier: ModelTier,
    /// Supported capabilities
    pub capabilities: Vec<Capability>,
    /// Context window size in tokens
    pub context_window: u32,
    /// Cost per 1M input tokens (USD)
    pub input_cost_per_million: f64,
    /// Cost per 1M output tokens (USD)
    pub output_cost_per_million: f64,
    /// Whether the model may be routed to
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ModelInfo {
    /// Create an enabled model entry
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        provider: ProviderName,
        name: impl Into<String>,
        tier: ModelTier,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            name: name.into(),
            tier,
            capabilities: vec![Capability::Chat],
            context_window: 128_000,
            input_cost_per_million: 0.0,
            output_cost_per_million: 0.0,
            enabled: true,
        }
    }

    /// Set per-million pricing (USD)
    #[must_use]
    pub fn with_pricing(mut self, input_per_million: f64, output_per_million: f64) -> Self {
        self.input_cost_per_million = input_per_million;
        self.output_cost_per_million = output_per_million;
        self
    }

    /// Set the capability list
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the context window
    #[must_use]
    pub fn with_context_window(mut self, context_window: u32) -> Self {
        self.context_window = context_window;
        self
    }

    /// Set the enabled flag
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether the model supports a capability
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether the model supports all of the given capabilities
    #[must_use]
    pub fn has_all(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().all(|c| self.has_capability(*c))
    }

    /// Cost of a single input token in cents
    #[must_use]
    pub fn input_cost_per_token_cents(&self) -> f64 {
        self.input_cost_per_million * 100.0 / 1_000_000.0
    }

    /// Cost of a single output token in cents
    #[must_use]
    pub fn output_cost_per_token_cents(&self) -> f64 {
        self.output_cost_per_million * 100.0 / 1_000_000.0
    }
}

// ============================================================================
// Default Catalog
// ============================================================================

fn chat_tools_vision() -> Vec<Capability> {
    vec![
        Capability::Chat,
        Capability::FunctionCalling,
        Capability::Vision,
        Capability::Streaming,
        Capability::JsonMode,
    ]
}

fn chat_tools() -> Vec<Capability> {
    vec![
        Capability::Chat,
        Capability::FunctionCalling,
        Capability::Streaming,
    ]
}

/// Default catalog seeded at registry construction
#[must_use]
pub fn default_catalog() -> Vec<ModelInfo> {
    use ModelTier::*;
    use ProviderName::*;

    vec![
        // OpenAI GPT-5 family
        ModelInfo::new("gpt-5", OpenAi, "GPT-5", Premium)
            .with_pricing(1.25, 10.00)
            .with_capabilities(chat_tools_vision())
            .with_context_window(400_000),
        ModelInfo::new("gpt-5-nano", OpenAi, "GPT-5 nano", Fast)
            .with_pricing(0.05, 0.40)
            .with_capabilities(chat_tools())
            .with_context_window(32_000),
        ModelInfo::new("gpt-4o-mini", OpenAi, "GPT-4o mini", Fast)
            .with_pricing(0.15, 0.60)
            .with_capabilities(chat_tools_vision()),
        ModelInfo::new("text-embedding-3-small", OpenAi, "Embedding 3 small", UltraBudget)
            .with_pricing(0.02, 0.0)
            .with_capabilities(vec![Capability::Embedding])
            .with_context_window(8_191),
        // Anthropic Claude 4.5 family
        ModelInfo::new("claude-opus-4-5-20250514", Anthropic, "Claude Opus 4.5", Premium)
            .with_pricing(5.00, 25.00)
            .with_capabilities(chat_tools_vision())
            .with_context_window(200_000),
        ModelInfo::new("claude-sonnet-4-5-20250929", Anthropic, "Claude Sonnet 4.5", Standard)
            .with_pricing(3.00, 15.00)
            .with_capabilities(chat_tools_vision())
            .with_context_window(200_000),
        ModelInfo::new("claude-haiku-4-5-20251001", Anthropic, "Claude Haiku 4.5", Fast)
            .with_pricing(1.00, 5.00)
            .with_capabilities(chat_tools_vision())
            .with_context_window(200_000),
        // Google Gemini 2.5 family
        ModelInfo::new("gemini-2.5-pro", Gemini, "Gemini 2.5 Pro", Standard)
            .with_pricing(1.25, 15.00)
            .with_capabilities(chat_tools_vision())
            .with_context_window(1_000_000),
        ModelInfo::new("gemini-2.5-flash", Gemini, "Gemini 2.5 Flash", Fast)
            .with_pricing(0.075, 0.60)
            .with_capabilities(chat_tools_vision())
            .with_context_window(1_000_000),
        // Groq
        ModelInfo::new("llama-3.3-70b-versatile", Groq, "Llama 3.3 70B", Standard)
            .with_pricing(0.59, 0.79)
            .with_capabilities(chat_tools()),
        ModelInfo::new("llama-3.1-8b-instant", Groq, "Llama 3.1 8B", UltraBudget)
            .with_pricing(0.05, 0.08),
        // DeepSeek
        ModelInfo::new("deepseek-chat", DeepSeek, "DeepSeek Chat", Fast)
            .with_pricing(0.14, 0.28)
            .with_capabilities(chat_tools())
            .with_context_window(64_000),
        ModelInfo::new("deepseek-reasoner", DeepSeek, "DeepSeek Reasoner", Premium)
            .with_pricing(0.55, 2.19)
            .with_context_window(64_000),
        // Qwen 3 family
        ModelInfo::new("qwen3-32b", Qwen, "Qwen3 32B", Standard)
            .with_pricing(0.20, 0.30)
            .with_capabilities(chat_tools()),
        // Local
        ModelInfo::new("qwen2.5:7b", Ollama, "Qwen 2.5 7B (local)", UltraBudget),
    ]
}
