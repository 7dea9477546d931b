//! Provider Registry - providers, health, and the model catalog
//!
//! # Module Structure
//!
//! - `provider`: Provider identity, configuration, capabilities, health state
//! - `catalog`: Model metadata, tiers, and the default catalog
//! - `registry_impl`: ProviderRegistry implementation

mod catalog;
mod provider;
mod registry_impl;


pub use catalog::{default_catalog, ModelInfo, ModelTier};
pub use provider::{
    Capability, HealthStatus, HealthTransition, Provider, ProviderConfig, ProviderHealth,
    ProviderName, DEGRADED_ERROR_THRESHOLD, UNAVAILABLE_ERROR_THRESHOLD,
};
pub use registry_impl::ProviderRegistry;
