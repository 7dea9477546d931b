//! Provider identity, configuration and health state

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors before a provider is considered degraded
pub const DEGRADED_ERROR_THRESHOLD: u32 = 3;

/// Errors before a provider is considered unavailable
pub const UNAVAILABLE_ERROR_THRESHOLD: u32 = 5;

/// Weight of the newest sample in the rolling latency average
const LATENCY_EWMA_ALPHA: f64 = 0.2;

// ============================================================================
// Provider Name
// ============================================================================

/// Supported providers
///
/// The set is closed: registering any other name is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    /// OpenAI
    OpenAi,
    /// Anthropic
    Anthropic,
    /// Google Gemini
    Gemini,
    /// Groq
    Groq,
    /// DeepSeek
    DeepSeek,
    /// Alibaba Qwen
    Qwen,
    /// Local Ollama
    Ollama,
    /// OpenRouter gateway
    OpenRouter,
}

impl ProviderName {
    /// Every supported provider
    pub const ALL: [ProviderName; 8] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::Gemini,
        Self::Groq,
        Self::DeepSeek,
        Self::Qwen,
        Self::Ollama,
        Self::OpenRouter,
    ];

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Groq => "groq",
            Self::DeepSeek => "deepseek",
            Self::Qwen => "qwen",
            Self::Ollama => "ollama",
            Self::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| Error::UnknownProvider(s.to_string()))
    }
}

// ============================================================================
// Capability
// ============================================================================

/// Something a provider or model can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Chat completion
    Chat,
    /// Tool / function calling
    FunctionCalling,
    /// Vector embeddings
    Embedding,
    /// Image input
    Vision,
    /// Streaming responses
    Streaming,
    /// Structured JSON output
    JsonMode,
}

// ============================================================================
// Provider Configuration
// ============================================================================

fn default_true() -> bool {
    true
}

/// Configuration for a provider, as supplied by the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name (validated on registration)
    pub name: String,
    /// Whether the provider is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Environment variable holding the API credential
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<String>,
    /// Declared capabilities
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl ProviderConfig {
    /// Create an enabled provider config with the given capabilities
    #[must_use]
    pub fn new(name: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            api_key_env: None,
            base_url: None,
            capabilities,
        }
    }

    /// Set the credential reference
    #[must_use]
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Set the enabled flag
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

// ============================================================================
// Health
// ============================================================================

/// Provider health status
///
/// Derived from the error count alone; successes never lower it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No reason to doubt the provider
    #[default]
    Unknown,
    /// Enough errors to be suspicious; still routable
    Degraded,
    /// Too many errors; excluded from routing until reset
    Unavailable,
}

impl HealthStatus {
    /// Status implied by an error count
    #[must_use]
    pub fn from_error_count(error_count: u32) -> Self {
        if error_count >= UNAVAILABLE_ERROR_THRESHOLD {
            Self::Unavailable
        } else if error_count >= DEGRADED_ERROR_THRESHOLD {
            Self::Degraded
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Status change caused by one observed error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthTransition {
    /// Status entered
    pub status: HealthStatus,
    /// Error count at the moment of the change
    pub error_count: u32,
}

/// Live health statistics of a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Current status
    pub status: HealthStatus,
    /// Successful calls observed
    pub success_count: u64,
    /// Errors since the last reset
    pub error_count: u32,
    /// Most recent observed latency
    pub latency_ms: Option<u64>,
    /// Rolling average latency
    pub avg_latency_ms: Option<f64>,
    /// Last success timestamp
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last error timestamp
    pub last_error_at: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    pub(crate) fn observe_success(&mut self, latency_ms: u64) {
        self.success_count += 1;
        self.latency_ms = Some(latency_ms);
        self.avg_latency_ms = Some(match self.avg_latency_ms {
            Some(avg) => avg + LATENCY_EWMA_ALPHA * (latency_ms as f64 - avg),
            None => latency_ms as f64,
        });
        self.last_success_at = Some(Utc::now());
    }

    /// Returns the transition when this error crossed a threshold
    pub(crate) fn observe_error(&mut self) -> Option<HealthTransition> {
        self.error_count = self.error_count.saturating_add(1);
        self.last_error_at = Some(Utc::now());
        let next = HealthStatus::from_error_count(self.error_count);
        if next == self.status {
            return None;
        }
        self.status = next;
        Some(HealthTransition {
            status: next,
            error_count: self.error_count,
        })
    }

    pub(crate) fn reset_errors(&mut self) {
        self.error_count = 0;
        self.status = HealthStatus::Unknown;
    }
}

/// A registered provider
#[derive(Debug, Clone, Serialize)]
pub struct Provider {
    /// Provider identity
    pub name: ProviderName,
    /// Whether the provider is enabled
    pub enabled: bool,
    /// Environment variable holding the API credential
    pub api_key_env: Option<String>,
    /// Base URL override
    pub base_url: Option<String>,
    /// Declared capabilities
    pub capabilities: Vec<Capability>,
    /// Live health state
    pub health: ProviderHealth,
}

impl Provider {
    /// Whether the provider declares a capability
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Enabled and not marked unavailable
    #[must_use]
    pub fn is_routable(&self) -> bool {
        self.enabled && self.health.status != HealthStatus::Unavailable
    }
}
