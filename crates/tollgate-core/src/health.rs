//! Health Checker - optional periodic provider probing
//!
//! A single background task probes every enabled provider on a fixed
//! interval and feeds the outcome into the registry. Lifecycle calls are
//! idempotent; `stop` waits for the task so no probe runs after it returns.

use crate::event_bus::{EventBus, GatewayEvent};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tollgate_llm::{ProviderName, ProviderRegistry};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

/// Health-check settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Run the background task on `initialize`
    pub enabled: bool,
    /// Seconds between probe rounds
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
        }
    }
}

/// Liveness probe for one provider
///
/// Implemented by the provider-client layer. Returns the observed latency
/// in milliseconds, or a description of the failure.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe a provider
    async fn probe(&self, provider: ProviderName) -> std::result::Result<u64, String>;
}

/// Record a provider error and publish the health transition it caused
pub(crate) fn record_provider_error(
    registry: &ProviderRegistry,
    events: &EventBus,
    provider: ProviderName,
) {
    match registry.record_error(provider) {
        Ok(Some(change)) => {
            if let Some(event) =
                GatewayEvent::for_transition(provider, change.status, change.error_count)
            {
                events.publish(event);
            }
        }
        Ok(None) => {}
        Err(e) => warn!(provider = %provider, error = %e, "Failed to record provider error"),
    }
}

async fn probe_all(
    registry: &ProviderRegistry,
    events: &EventBus,
    probe: &dyn HealthProbe,
) -> usize {
    let providers: Vec<ProviderName> = registry
        .get_available_providers()
        .into_iter()
        .map(|p| p.name)
        .collect();

    let outcomes = join_all(providers.iter().map(|name| probe.probe(*name))).await;
    for (provider, outcome) in providers.iter().zip(outcomes) {
        match outcome {
            Ok(latency_ms) => {
                if let Err(e) = registry.record_success(*provider, latency_ms) {
                    warn!(provider = %provider, error = %e, "Failed to record probe success");
                }
            }
            Err(reason) => {
                debug!(provider = %provider, reason = %reason, "Health probe failed");
                record_provider_error(registry, events, *provider);
            }
        }
    }
    providers.len()
}

/// Owns the background probing task
pub struct HealthChecker {
    registry: Arc<ProviderRegistry>,
    events: EventBus,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl HealthChecker {
    /// Create a stopped checker
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        events: EventBus,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            probe,
            interval: interval.max(Duration::from_millis(1)),
            task: Mutex::new(None),
        }
    }

    /// Probe interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the background task is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Spawn the background task
    ///
    /// Returns false when it was already running. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let shutdown = token.clone();
        let registry = Arc::clone(&self.registry);
        let events = self.events.clone();
        let probe = Arc::clone(&self.probe);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let probed = probe_all(&registry, &events, probe.as_ref()).await;
                        debug!(probed, "Health check round complete");
                    }
                }
            }
        });

        *task = Some((token, handle));
        info!(interval_ms = interval.as_millis() as u64, "Health checker started");
        true
    }

    /// Cancel the background task and wait for it to finish
    ///
    /// Returns false when it was not running.
    pub async fn stop(&self) -> bool {
        let running = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some((token, handle)) = running else {
            return false;
        };

        token.cancel();
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Health check task ended abnormally");
            }
        }
        info!("Health checker stopped");
        true
    }

    /// Probe every enabled provider once
    ///
    /// Returns the number of providers probed.
    pub async fn run_once(&self) -> usize {
        probe_all(&self.registry, &self.events, self.probe.as_ref()).await
    }
}
