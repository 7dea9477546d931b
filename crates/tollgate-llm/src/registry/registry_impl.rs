//! Provider registry implementation

use super::catalog::{default_catalog, ModelInfo};
use super::provider::{
    Capability, HealthTransition, Provider, ProviderConfig, ProviderHealth, ProviderName,
};
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Registry of providers, their health, and the model catalog
///
/// Every mutation is keyed: two providers never contend on one lock.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: DashMap<ProviderName, Provider>,
    models: DashMap<String, ModelInfo>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Create a registry seeded with the default catalog
    #[must_use]
    pub fn new() -> Self {
        let registry = Self::empty();
        for model in default_catalog() {
            registry.models.insert(model.id.clone(), model);
        }
        registry
    }

    /// Create a registry with no providers and no models
    #[must_use]
    pub fn empty() -> Self {
        Self {
            providers: DashMap::new(),
            models: DashMap::new(),
        }
    }

    // ========================================================================
    // Providers
    // ========================================================================

    /// Register (or re-register) a provider
    ///
    /// Re-registration replaces the configuration but keeps health counters.
    pub fn register_provider(&self, config: ProviderConfig) -> Result<ProviderName> {
        let name: ProviderName = config.name.parse()?;
        let health = self
            .providers
            .get(&name)
            .map(|p| p.health.clone())
            .unwrap_or_default();

        debug!(provider = %name, enabled = config.enabled, "Registering provider");
        self.providers.insert(
            name,
            Provider {
                name,
                enabled: config.enabled,
                api_key_env: config.api_key_env,
                base_url: config.base_url,
                capabilities: config.capabilities,
                health,
            },
        );
        Ok(name)
    }

    /// Remove a provider, returning whether it existed
    pub fn unregister_provider(&self, name: &str) -> bool {
        match name.parse::<ProviderName>() {
            Ok(name) => self.providers.remove(&name).is_some(),
            Err(_) => false,
        }
    }

    /// Get a provider snapshot
    #[must_use]
    pub fn get_provider(&self, name: ProviderName) -> Option<Provider> {
        self.providers.get(&name).map(|p| p.clone())
    }

    /// Enabled providers, regardless of health
    #[must_use]
    pub fn get_available_providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self
            .providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.clone())
            .collect();
        providers.sort_by_key(|p| p.name);
        providers
    }

    /// Names of every registered provider
    #[must_use]
    pub fn provider_names(&self) -> Vec<ProviderName> {
        let mut names: Vec<ProviderName> = self.providers.iter().map(|p| *p.key()).collect();
        names.sort();
        names
    }

    /// Whether a provider declares a capability
    #[must_use]
    pub fn has_capability(&self, name: ProviderName, capability: Capability) -> bool {
        self.providers
            .get(&name)
            .map(|p| p.has_capability(capability))
            .unwrap_or(false)
    }

    /// Whether a provider is registered, enabled and not unavailable
    #[must_use]
    pub fn is_routable(&self, name: ProviderName) -> bool {
        self.providers
            .get(&name)
            .map(|p| p.is_routable())
            .unwrap_or(false)
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Record a successful call
    pub fn record_success(&self, name: ProviderName, latency_ms: u64) -> Result<()> {
        let mut provider = self
            .providers
            .get_mut(&name)
            .ok_or_else(|| Error::ProviderNotRegistered(name.to_string()))?;
        provider.health.observe_success(latency_ms);
        debug!(provider = %name, latency_ms, "Provider success recorded");
        Ok(())
    }

    /// Record a failed call
    ///
    /// Returns the status change, with the error count observed under the
    /// same lock, when this error crossed a health threshold.
    pub fn record_error(&self, name: ProviderName) -> Result<Option<HealthTransition>> {
        let mut provider = self
            .providers
            .get_mut(&name)
            .ok_or_else(|| Error::ProviderNotRegistered(name.to_string()))?;
        let transition = provider.health.observe_error();
        let error_count = provider.health.error_count;
        drop(provider);

        match transition {
            Some(change) => warn!(
                provider = %name,
                error_count,
                status = %change.status,
                "Provider health changed"
            ),
            None => debug!(provider = %name, error_count, "Provider error recorded"),
        }
        Ok(transition)
    }

    /// Clear errors and return the provider to `unknown`
    pub fn reset_errors(&self, name: ProviderName) -> Result<()> {
        let mut provider = self
            .providers
            .get_mut(&name)
            .ok_or_else(|| Error::ProviderNotRegistered(name.to_string()))?;
        provider.health.reset_errors();
        info!(provider = %name, "Provider errors reset");
        Ok(())
    }

    /// Health of one provider
    #[must_use]
    pub fn get_health(&self, name: ProviderName) -> Option<ProviderHealth> {
        self.providers.get(&name).map(|p| p.health.clone())
    }

    /// Health of every registered provider
    #[must_use]
    pub fn health_snapshot(&self) -> Vec<(ProviderName, ProviderHealth)> {
        let mut snapshot: Vec<_> = self
            .providers
            .iter()
            .map(|p| (p.name, p.health.clone()))
            .collect();
        snapshot.sort_by_key(|(name, _)| *name);
        snapshot
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Add or override a model by id, returning the replaced entry
    pub fn register_model(&self, model: ModelInfo) -> Option<ModelInfo> {
        debug!(model = %model.id, provider = %model.provider, "Registering model");
        self.models.insert(model.id.clone(), model)
    }

    /// Look up a model
    #[must_use]
    pub fn get_model(&self, id: &str) -> Option<ModelInfo> {
        self.models.get(id).map(|m| m.clone())
    }

    /// Every model in the catalog, ordered by id
    #[must_use]
    pub fn get_all_models(&self) -> Vec<ModelInfo> {
        let mut models: Vec<ModelInfo> = self.models.iter().map(|m| m.clone()).collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }

    /// Models supporting a capability, ordered by id
    #[must_use]
    pub fn get_models_by_capability(&self, capability: Capability) -> Vec<ModelInfo> {
        self.get_all_models()
            .into_iter()
            .filter(|m| m.has_capability(capability))
            .collect()
    }

    /// Enabled models whose provider is routable, ordered by id
    #[must_use]
    pub fn routable_models(&self) -> Vec<ModelInfo> {
        let routable: HashSet<ProviderName> = self
            .providers
            .iter()
            .filter(|p| p.is_routable())
            .map(|p| p.name)
            .collect();
        self.get_all_models()
            .into_iter()
            .filter(|m| m.enabled && routable.contains(&m.provider))
            .collect()
    }

    /// Highest-tier enabled model with the capability on a routable provider
    ///
    /// Ties go to the cheaper model, then to the lower id.
    #[must_use]
    pub fn find_best_model(&self, capability: Capability) -> Option<ModelInfo> {
        self.routable_models()
            .into_iter()
            .filter(|m| m.has_capability(capability))
            .min_by(|a, b| {
                b.tier
                    .cmp(&a.tier)
                    .then_with(|| {
                        let a_price = a.input_cost_per_million + a.output_cost_per_million;
                        let b_price = b.input_cost_per_million + b.output_cost_per_million;
                        a_price.total_cmp(&b_price)
                    })
                    .then_with(|| a.id.cmp(&b.id))
            })
    }
}
