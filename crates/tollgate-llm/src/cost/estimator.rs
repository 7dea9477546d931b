//! Cost Estimator - predicted and actual request cost

use crate::completion::CompletionRequest;
use crate::registry::{ModelInfo, ProviderName, ProviderRegistry};
use crate::token::TokenEstimator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Default cost per 1M input tokens (USD) for unknown models
pub const DEFAULT_INPUT_COST_PER_MILLION: f64 = 5.0;

/// Default cost per 1M output tokens (USD) for unknown models
pub const DEFAULT_OUTPUT_COST_PER_MILLION: f64 = 15.0;

/// Output tokens assumed when the request sets no `max_tokens`
pub const DEFAULT_OUTPUT_TOKENS: u32 = 500;

/// Model used when neither the caller nor the request names one
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Confidence for catalog models (token counts are heuristic)
pub const KNOWN_MODEL_CONFIDENCE: f64 = 0.85;

/// Confidence when falling back to default pricing
pub const UNKNOWN_MODEL_CONFIDENCE: f64 = 0.5;

fn usd_per_million_to_cents(tokens: u32, usd_per_million: f64) -> f64 {
    tokens as f64 * usd_per_million * 100.0 / 1_000_000.0
}

// ============================================================================
// Types
// ============================================================================

/// Estimator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Model assumed when a request names none
    pub default_model: String,
    /// Output tokens assumed when a request sets no limit
    pub default_output_tokens: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            default_output_tokens: DEFAULT_OUTPUT_TOKENS,
        }
    }
}

/// Predicted cost of a request on one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Model the estimate is for
    pub model: String,
    /// Owning provider, when the model is known
    pub provider: Option<ProviderName>,
    /// Estimated prompt tokens (messages + tools)
    pub estimated_input_tokens: u32,
    /// Assumed completion tokens
    pub estimated_output_tokens: u32,
    /// Estimated cost in cents
    pub estimated_cost_cents: f64,
    /// 0.0 - 1.0; below 1 because token counts are approximate
    pub confidence: f64,
}

/// Display pricing per 1000 tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostPer1K {
    /// Model id
    pub model: String,
    /// Cents per 1000 input tokens
    pub input_cents: f64,
    /// Cents per 1000 output tokens
    pub output_cents: f64,
    /// Whether default pricing was used
    pub is_default_pricing: bool,
}

// ============================================================================
// Estimator
// ============================================================================

/// Combines token estimates with catalog pricing
#[derive(Debug, Clone)]
pub struct CostEstimator {
    registry: Arc<ProviderRegistry>,
    tokens: TokenEstimator,
    config: EstimatorConfig,
}

impl CostEstimator {
    /// Create an estimator with default settings
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::with_config(registry, EstimatorConfig::default())
    }

    /// Create an estimator with explicit settings
    #[must_use]
    pub fn with_config(registry: Arc<ProviderRegistry>, config: EstimatorConfig) -> Self {
        Self {
            registry,
            tokens: TokenEstimator::new(),
            config,
        }
    }

    /// Settings in effect
    #[must_use]
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimated prompt tokens for a request (messages + tool schemas)
    #[must_use]
    pub fn estimate_input_tokens(&self, request: &CompletionRequest) -> u32 {
        let mut tokens = self.tokens.count_message_tokens(&request.messages);
        if !request.tools.is_empty() {
            tokens += self.tokens.count_tool_tokens(&request.tools);
        }
        u32::try_from(tokens).unwrap_or(u32::MAX)
    }

    /// Estimate a request's cost
    ///
    /// The model is resolved from `model_id`, then the request, then the
    /// configured default. Unknown models are priced with default rates and
    /// a lower confidence; this never fails.
    #[must_use]
    pub fn estimate(&self, request: &CompletionRequest, model_id: Option<&str>) -> CostEstimate {
        let model_id = model_id
            .or(request.model.as_deref())
            .unwrap_or(&self.config.default_model);
        let input_tokens = self.estimate_input_tokens(request);
        let output_tokens = request
            .max_tokens
            .unwrap_or(self.config.default_output_tokens);

        match self.registry.get_model(model_id) {
            Some(model) => self.estimate_for(&model, input_tokens, output_tokens),
            None => {
                debug!(model = %model_id, "Estimating unknown model with default pricing");
                CostEstimate {
                    model: model_id.to_string(),
                    provider: None,
                    estimated_input_tokens: input_tokens,
                    estimated_output_tokens: output_tokens,
                    estimated_cost_cents: usd_per_million_to_cents(
                        input_tokens,
                        DEFAULT_INPUT_COST_PER_MILLION,
                    ) + usd_per_million_to_cents(
                        output_tokens,
                        DEFAULT_OUTPUT_COST_PER_MILLION,
                    ),
                    confidence: UNKNOWN_MODEL_CONFIDENCE,
                }
            }
        }
    }

    fn estimate_for(
        &self,
        model: &ModelInfo,
        input_tokens: u32,
        output_tokens: u32,
    ) -> CostEstimate {
        CostEstimate {
            model: model.id.clone(),
            provider: Some(model.provider),
            estimated_input_tokens: input_tokens,
            estimated_output_tokens: output_tokens,
            estimated_cost_cents: usd_per_million_to_cents(
                input_tokens,
                model.input_cost_per_million,
            ) + usd_per_million_to_cents(output_tokens, model.output_cost_per_million),
            confidence: KNOWN_MODEL_CONFIDENCE,
        }
    }

    /// Exact cost in cents once true token counts are known
    #[must_use]
    pub fn calculate_actual_cost(
        &self,
        model_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> f64 {
        let (input_rate, output_rate) = match self.registry.get_model(model_id) {
            Some(model) => (model.input_cost_per_million, model.output_cost_per_million),
            None => (
                DEFAULT_INPUT_COST_PER_MILLION,
                DEFAULT_OUTPUT_COST_PER_MILLION,
            ),
        };
        usd_per_million_to_cents(prompt_tokens, input_rate)
            + usd_per_million_to_cents(completion_tokens, output_rate)
    }

    /// Cheapest enabled model able to serve the request
    ///
    /// Ties go to the lower model id.
    #[must_use]
    pub fn find_cheapest_model(&self, request: &CompletionRequest) -> Option<CostEstimate> {
        let required = request.effective_capabilities();
        let input_tokens = self.estimate_input_tokens(request);
        let output_tokens = request
            .max_tokens
            .unwrap_or(self.config.default_output_tokens);

        self.registry
            .get_all_models()
            .iter()
            .filter(|m| m.enabled && m.has_all(&required))
            .map(|m| self.estimate_for(m, input_tokens, output_tokens))
            .min_by(|a, b| {
                a.estimated_cost_cents
                    .total_cmp(&b.estimated_cost_cents)
                    .then_with(|| a.model.cmp(&b.model))
            })
    }

    /// Per-1000-token pricing for display
    #[must_use]
    pub fn get_cost_per_1k(&self, model_id: &str) -> CostPer1K {
        match self.registry.get_model(model_id) {
            Some(model) => CostPer1K {
                model: model.id,
                input_cents: usd_per_million_to_cents(1_000, model.input_cost_per_million),
                output_cents: usd_per_million_to_cents(1_000, model.output_cost_per_million),
                is_default_pricing: false,
            },
            None => CostPer1K {
                model: model_id.to_string(),
                input_cents: usd_per_million_to_cents(1_000, DEFAULT_INPUT_COST_PER_MILLION),
                output_cents: usd_per_million_to_cents(1_000, DEFAULT_OUTPUT_COST_PER_MILLION),
                is_default_pricing: true,
            },
        }
    }
}
