//! Tollgate LLM - provider catalog, cost estimation and routing
//!
//! This crate holds the model-facing half of the Tollgate gateway:
//! - Registry: providers, their health state, and the model catalog
//! - Token: character-based token estimation
//! - Cost: predicted and actual request cost in cents
//! - Router: strategy-based model selection with fallback chains
//!
//! Nothing here talks to a provider over the network; callers report
//! outcomes back through the registry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod cost;
pub mod error;
pub mod message;
pub mod registry;
pub mod router;
pub mod token;
pub mod tools;

pub use completion::{CompletionRequest, TokenUsage};
pub use cost::{CostEstimate, CostEstimator, CostPer1K, EstimatorConfig};
pub use error::{Error, Result};
pub use message::{Message, MessageRole};
pub use registry::{
    default_catalog, Capability, HealthStatus, HealthTransition, ModelInfo, ModelTier, Provider,
    ProviderConfig, ProviderHealth, ProviderName, ProviderRegistry,
};
pub use router::{ModelRouter, Route, RoutingDecision, RoutingStrategy, SelectionCriteria};
pub use token::{count_message_tokens, count_tokens, count_tool_tokens, TokenEstimator};
pub use tools::ToolDefinition;
