//! Gateway configuration
//!
//! Plain serde types; loading and layering happen in the binary.

use crate::cleanup::CleanupConfig;
use crate::error::{Error, Result};
use crate::event_bus::DEFAULT_EVENT_CAPACITY;
use crate::health::HealthCheckConfig;
use crate::loop_detector::LoopDetectionConfig;
use crate::rate_limiter::RateLimitConfig;
use crate::usage::DEFAULT_MAX_RECORDS;
use serde::{Deserialize, Serialize};
use tollgate_llm::{EstimatorConfig, ModelInfo, ProviderConfig, ProviderName, Route};

/// Everything needed to build a [`Gateway`](crate::Gateway)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Providers to register
    pub providers: Vec<ProviderConfig>,
    /// Catalog additions and overrides
    pub models: Vec<ModelInfo>,
    /// Named routes
    pub routes: Vec<Route>,
    /// Rate-limit tier table
    pub rate_limits: RateLimitConfig,
    /// Loop detection thresholds
    pub loop_detection: LoopDetectionConfig,
    /// Cost estimator defaults
    pub estimator: EstimatorConfig,
    /// Background provider probing
    pub health_check: HealthCheckConfig,
    /// Idle-state sweeping and reservation lifetime
    pub cleanup: CleanupConfig,
    /// Event channel capacity
    pub event_capacity: usize,
    /// Usage records kept by the in-memory store
    pub max_usage_records: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            models: Vec::new(),
            routes: Vec::new(),
            rate_limits: RateLimitConfig::default(),
            loop_detection: LoopDetectionConfig::default(),
            estimator: EstimatorConfig::default(),
            health_check: HealthCheckConfig::default(),
            cleanup: CleanupConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_usage_records: DEFAULT_MAX_RECORDS,
        }
    }
}

impl GatewayConfig {
    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        for provider in &self.providers {
            provider
                .name
                .parse::<ProviderName>()
                .map_err(|e| Error::Configuration(e.to_string()))?;
        }

        if !self.rate_limits.tiers.contains_key(&self.rate_limits.default_tier) {
            return Err(Error::Configuration(format!(
                "default tier '{}' is not defined",
                self.rate_limits.default_tier
            )));
        }

        let loops = &self.loop_detection;
        if loops.window_size == 0 {
            return Err(Error::Configuration(
                "loop_detection.window_size must be positive".to_string(),
            ));
        }
        if !(loops.similarity_threshold > 0.0 && loops.similarity_threshold <= 1.0) {
            return Err(Error::Configuration(
                "loop_detection.similarity_threshold must be in (0, 1]".to_string(),
            ));
        }

        if self.health_check.enabled && self.health_check.interval_secs == 0 {
            return Err(Error::Configuration(
                "health_check.interval_secs must be positive".to_string(),
            ));
        }
        if self.cleanup.reservation_ttl_secs == 0 {
            return Err(Error::Configuration(
                "cleanup.reservation_ttl_secs must be positive".to_string(),
            ));
        }
        if self.max_usage_records == 0 {
            return Err(Error::Configuration(
                "max_usage_records must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
