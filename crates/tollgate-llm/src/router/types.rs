//! Core types for model routing
//!
//! Routes, selection strategies, filtering criteria, and the routing decision.

use crate::cost::CostEstimate;
use crate::registry::{Capability, ModelInfo, ModelTier, ProviderName};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Strategy
// ============================================================================

/// How a route picks among candidate models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Lowest estimated cost
    #[default]
    CostOptimized,
    /// Highest tier
    QualityOptimized,
    /// Rotate through candidates
    RoundRobin,
    /// Walk the fallback chain, then lowest cost
    Failover,
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CostOptimized => write!(f, "cost_optimized"),
            Self::QualityOptimized => write!(f, "quality_optimized"),
            Self::RoundRobin => write!(f, "round_robin"),
            Self::Failover => write!(f, "failover"),
        }
    }
}

// ============================================================================
// Route
// ============================================================================

fn default_true() -> bool {
    true
}

/// A named routing policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Route id
    pub id: String,
    /// Selection strategy
    #[serde(default)]
    pub strategy: RoutingStrategy,
    /// Ordered model ids to try after the preferred one fails
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    /// Whether the route is active
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Route {
    /// Create an enabled route
    #[must_use]
    pub fn new(id: impl Into<String>, strategy: RoutingStrategy) -> Self {
        Self {
            id: id.into(),
            strategy,
            fallback_chain: Vec::new(),
            enabled: true,
        }
    }

    /// Set the fallback chain
    #[must_use]
    pub fn with_fallback_chain<I, S>(mut self, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_chain = chain.into_iter().map(Into::into).collect();
        self
    }

    /// Route used when the caller names none
    #[must_use]
    pub(crate) fn implicit_default() -> Self {
        Self::new("default", RoutingStrategy::CostOptimized)
    }
}

// ============================================================================
// Criteria
// ============================================================================

/// Optional filters narrowing the candidate set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionCriteria {
    /// Capability every candidate must have
    pub required_capability: Option<Capability>,
    /// Allow-list of providers; empty allows all
    pub preferred_providers: Vec<ProviderName>,
    /// Minimum quality tier
    pub min_tier: Option<ModelTier>,
}

impl SelectionCriteria {
    /// Require a capability
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.required_capability = Some(capability);
        self
    }

    /// Restrict to the given providers
    #[must_use]
    pub fn with_providers(mut self, providers: Vec<ProviderName>) -> Self {
        self.preferred_providers = providers;
        self
    }

    /// Require at least this tier
    #[must_use]
    pub fn with_min_tier(mut self, tier: ModelTier) -> Self {
        self.min_tier = Some(tier);
        self
    }

    /// Whether a model passes every filter
    #[must_use]
    pub fn matches(&self, model: &ModelInfo) -> bool {
        if let Some(cap) = self.required_capability {
            if !model.has_capability(cap) {
                return false;
            }
        }
        if !self.preferred_providers.is_empty()
            && !self.preferred_providers.contains(&model.provider)
        {
            return false;
        }
        if let Some(min) = self.min_tier {
            if !model.tier.at_least(min) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Decision
// ============================================================================

/// Outcome of model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected model id
    pub model: String,
    /// Provider serving the model
    pub provider: ProviderName,
    /// Tier of the selected model
    pub tier: ModelTier,
    /// Human-readable reason
    pub reason: String,
    /// Route that produced the decision, if a named one
    pub route_id: Option<String>,
    /// Strategy applied; `None` for an explicit model
    pub strategy: Option<RoutingStrategy>,
    /// Estimate computed while selecting, when available
    pub estimate: Option<CostEstimate>,
}
