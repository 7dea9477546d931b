//! Gateway facade implementation

use super::types::{CompletionReport, FailureReport, PreflightOptions, PreflightResult};
use crate::budget::{BudgetManager, BudgetStore, InMemoryBudgetStore};
use crate::cleanup::{CleanupReport, StateSweeper};
use crate::config::GatewayConfig;
use crate::error::{Error, GatewayError, Result};
use crate::event_bus::{EventBus, GatewayEvent};
use crate::health::{record_provider_error, HealthChecker, HealthProbe};
use crate::loop_detector::{LoopDetection, LoopDetector};
use crate::rate_limiter::RateLimiter;
use crate::usage::{InMemoryUsageStore, UsageRecord, UsageStore, UsageTracker};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tollgate_llm::{
    CompletionRequest, CostEstimator, ModelRouter, ProviderRegistry, RoutingDecision,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// The decision layer in front of the providers
///
/// One instance is built at startup and shared (usually behind an `Arc`)
/// by every request handler.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<ProviderRegistry>,
    estimator: Arc<CostEstimator>,
    router: ModelRouter,
    budgets: Arc<BudgetManager>,
    usage: UsageTracker,
    rate_limiter: Arc<RateLimiter>,
    loop_detector: Arc<LoopDetector>,
    events: EventBus,
    health: Option<HealthChecker>,
    sweeper: StateSweeper,
    initialized: AtomicBool,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("providers", &self.registry.provider_names())
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Build a gateway with in-memory stores
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let usage_store = Arc::new(InMemoryUsageStore::with_max_records(
            config.max_usage_records,
        ));
        Self::with_stores(config, Arc::new(InMemoryBudgetStore::default()), usage_store)
    }

    /// Build a gateway over external store collaborators
    pub fn with_stores(
        config: GatewayConfig,
        budget_store: Arc<dyn BudgetStore>,
        usage_store: Arc<dyn UsageStore>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ProviderRegistry::new());
        for model in &config.models {
            registry.register_model(model.clone());
        }
        for provider in &config.providers {
            registry.register_provider(provider.clone())?;
        }

        let estimator = Arc::new(CostEstimator::with_config(
            Arc::clone(&registry),
            config.estimator.clone(),
        ));
        let router = ModelRouter::new(Arc::clone(&registry), Arc::clone(&estimator));
        for route in &config.routes {
            router.register_route(route.clone())?;
        }

        let events = EventBus::new(config.event_capacity);
        let budgets = Arc::new(
            BudgetManager::new(budget_store, events.clone()).with_reservation_ttl(
                Duration::from_secs(config.cleanup.reservation_ttl_secs),
            ),
        );
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        let loop_detector = Arc::new(LoopDetector::new(config.loop_detection.clone()));
        let sweeper = StateSweeper::new(
            Arc::clone(&budgets),
            Arc::clone(&rate_limiter),
            Arc::clone(&loop_detector),
            Duration::from_secs(config.cleanup.interval_secs),
        );

        let gateway = Self {
            budgets,
            usage: UsageTracker::new(usage_store),
            rate_limiter,
            loop_detector,
            registry,
            estimator,
            router,
            events,
            health: None,
            sweeper,
            initialized: AtomicBool::new(false),
            config,
        };

        info!(
            providers = gateway.registry.provider_names().len(),
            models = gateway.registry.get_all_models().len(),
            routes = gateway.router.list_routes().len(),
            "Gateway built"
        );
        Ok(gateway)
    }

    /// Attach the probe used by the background health check
    #[must_use]
    pub fn with_health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        let interval = Duration::from_secs(self.config.health_check.interval_secs);
        self.health = Some(HealthChecker::new(
            Arc::clone(&self.registry),
            self.events.clone(),
            probe,
            interval,
        ));
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load stored budgets and start background tasks
    ///
    /// The state sweeper runs unless `cleanup.interval_secs` is 0; the health
    /// check runs when enabled and a probe is attached.
    ///
    /// Calling it again while initialized does nothing.
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let loaded = match self.budgets.load_from_store().await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.initialized.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let health_started = match (&self.health, self.config.health_check.enabled) {
            (Some(checker), true) => checker.start(),
            (None, true) => {
                warn!("Health check enabled but no probe attached");
                false
            }
            _ => false,
        };

        let sweeper_started = self.config.cleanup.interval_secs > 0 && self.sweeper.start();

        info!(
            budgets = loaded,
            health_check = health_started,
            sweeper = sweeper_started,
            "Gateway initialized"
        );
        Ok(())
    }

    /// Stop background work
    ///
    /// Safe to call repeatedly and without a prior `initialize`.
    pub async fn shutdown(&self) {
        if let Some(checker) = &self.health {
            checker.stop().await;
        }
        self.sweeper.stop().await;
        if self.initialized.swap(false, Ordering::SeqCst) {
            info!("Gateway shut down");
        }
    }

    // ========================================================================
    // Preflight
    // ========================================================================

    /// Decide whether and where a request may go
    ///
    /// Runs, in order: the rate-limit check (nothing is consumed), loop
    /// detection when a conversation is given, model selection, cost
    /// estimation and, when budget-scoped, an atomic reservation of the
    /// estimated cost under the returned `request_id`. The newest message
    /// joins the conversation's history only when the request is approved.
    #[instrument(skip(self, request, options), fields(route_id = ?options.route_id))]
    pub async fn preflight_check(
        &self,
        user_id: &str,
        request: &CompletionRequest,
        options: PreflightOptions,
    ) -> Result<PreflightResult> {
        let request_id = Uuid::new_v4().to_string();

        let rate_limit_status = self.rate_limiter.check_request(user_id);
        if rate_limit_status.is_limited {
            let retry_after = rate_limit_status
                .retry_after()
                .unwrap_or(crate::rate_limiter::WINDOW);
            let error = GatewayError::rate_limited(retry_after);
            self.events.publish(GatewayEvent::RateLimited {
                user_id: user_id.to_string(),
                retry_after_ms: error.retry_after_ms.unwrap_or_default(),
            });
            info!(user_id, "Preflight rejected: rate limited");
            return Ok(PreflightResult::rejected(request_id, rate_limit_status, error));
        }

        let warning = match options.conversation_id.as_deref() {
            Some(conversation_id) => match self.detect_loop(conversation_id, request) {
                Some(detection) if detection.should_stop() => {
                    let error = GatewayError::loop_detected(conversation_id, &detection.reason);
                    info!(user_id, conversation_id, "Preflight rejected: loop detected");
                    return Ok(PreflightResult::rejected(request_id, rate_limit_status, error));
                }
                other => other,
            },
            None => None,
        };

        let decision = self.router.select_model(
            request,
            options.route_id.as_deref(),
            options.criteria.as_ref(),
        )?;
        let estimate = match &decision.estimate {
            Some(estimate) => estimate.clone(),
            None => self.estimator.estimate(request, Some(&decision.model)),
        };

        let mut reservation = None;
        if let Some(budget_id) = options.budget_id.as_deref() {
            match self
                .budgets
                .reserve(budget_id, &request_id, estimate.estimated_cost_cents)?
            {
                Some(hold) => reservation = Some(hold),
                None => {
                    let remaining = self.budgets.get_status(budget_id)?.remaining_cents;
                    let error = GatewayError::budget_exceeded(
                        budget_id,
                        remaining,
                        estimate.estimated_cost_cents,
                    );
                    info!(user_id, budget_id, "Preflight rejected: budget exceeded");
                    return Ok(PreflightResult {
                        decision: Some(decision),
                        estimate: Some(estimate),
                        warning,
                        ..PreflightResult::rejected(request_id, rate_limit_status, error)
                    });
                }
            }
        }

        if let Some(conversation_id) = options.conversation_id.as_deref() {
            self.record_turn(conversation_id, request);
        }

        debug!(
            user_id,
            request_id = %request_id,
            model = %decision.model,
            estimated_cost_cents = estimate.estimated_cost_cents,
            "Preflight approved"
        );
        Ok(PreflightResult {
            allowed: true,
            request_id,
            decision: Some(decision),
            estimate: Some(estimate),
            rate_limit_status,
            reservation,
            error: None,
            warning,
        })
    }

    fn detect_loop(
        &self,
        conversation_id: &str,
        request: &CompletionRequest,
    ) -> Option<LoopDetection> {
        let newest = request.messages.last()?;
        let detection = self
            .loop_detector
            .detect(conversation_id, std::slice::from_ref(newest));
        if !detection.is_loop {
            return None;
        }
        if let Some(loop_type) = detection.loop_type {
            self.events.publish(GatewayEvent::LoopDetected {
                conversation_id: conversation_id.to_string(),
                loop_type,
                confidence: detection.confidence,
                action: detection.action,
            });
        }
        Some(detection)
    }

    fn record_turn(&self, conversation_id: &str, request: &CompletionRequest) {
        if let Some(newest) = request.messages.last() {
            self.loop_detector
                .add_to_history(conversation_id, std::slice::from_ref(newest));
        }
    }

    // ========================================================================
    // Outcomes
    // ========================================================================

    /// Record a successful provider call
    ///
    /// Prices the call from the reported tokens, stores a usage record,
    /// credits the provider's health and charges the budget. The preflight
    /// reservation is settled when it is still held; otherwise `budget_id`
    /// is charged directly.
    #[instrument(
        skip(self, report),
        fields(request_id = %report.request_id, model = %report.model)
    )]
    pub async fn record_completion(
        &self,
        user_id: &str,
        report: CompletionReport,
    ) -> Result<UsageRecord> {
        let cost_cents = self.estimator.calculate_actual_cost(
            &report.model,
            report.usage.prompt_tokens,
            report.usage.completion_tokens,
        );

        let mut record = UsageRecord::success(
            user_id,
            &report.request_id,
            report.provider.as_str(),
            &report.model,
            report.usage,
            cost_cents,
            report.latency_ms,
        );
        record.id = self.usage.record(record.clone()).await;

        if let Err(e) = self.registry.record_success(report.provider, report.latency_ms) {
            warn!(
                provider = %report.provider,
                error = %e,
                "Completion from unregistered provider"
            );
        }

        match self.budgets.settle(&report.request_id, cost_cents).await {
            Ok(_) => {}
            Err(Error::ReservationNotFound(_)) => {
                if let Some(budget_id) = report.budget_id.as_deref() {
                    self.budgets.record_spending(budget_id, cost_cents).await?;
                }
            }
            Err(e) => return Err(e),
        }

        debug!(user_id, cost_cents, "Completion recorded");
        Ok(record)
    }

    /// Record a failed provider call
    ///
    /// Stores a failed usage record, counts the error against the provider
    /// and drops any budget reservation.
    #[instrument(
        skip(self, report),
        fields(request_id = %report.request_id, model = %report.model)
    )]
    pub async fn record_failure(&self, user_id: &str, report: FailureReport) -> UsageRecord {
        let mut record = UsageRecord::failure(
            user_id,
            &report.request_id,
            report.provider.as_str(),
            &report.model,
            &report.error,
            report.latency_ms,
        );
        record.id = self.usage.record(record.clone()).await;

        record_provider_error(&self.registry, &self.events, report.provider);
        self.budgets.release(&report.request_id);

        debug!(user_id, provider = %report.provider, "Failure recorded");
        record
    }

    /// Drop the reservation of a request that will not be sent
    pub fn cancel_request(&self, request_id: &str) -> bool {
        self.budgets.release(request_id)
    }

    /// Sweep idle rate-limit, conversation and reservation state now
    pub fn run_cleanup(&self) -> CleanupReport {
        self.sweeper.run_once()
    }

    /// Next model to try after a failure
    pub fn get_fallback(
        &self,
        failed_model_id: &str,
        request: &CompletionRequest,
        route_id: Option<&str>,
    ) -> Result<RoutingDecision> {
        Ok(self.router.get_fallback(failed_model_id, request, route_id)?)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Configuration the gateway was built with
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Provider registry
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Cost estimator
    #[must_use]
    pub fn estimator(&self) -> &CostEstimator {
        &self.estimator
    }

    /// Model router
    #[must_use]
    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Budget manager
    #[must_use]
    pub fn budgets(&self) -> &BudgetManager {
        &self.budgets
    }

    /// Usage tracker
    #[must_use]
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Rate limiter
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Loop detector
    #[must_use]
    pub fn loop_detector(&self) -> &LoopDetector {
        &self.loop_detector
    }

    /// Event bus
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to gateway events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Whether the background health check is running
    #[must_use]
    pub fn health_check_running(&self) -> bool {
        self.health.as_ref().is_some_and(HealthChecker::is_running)
    }

    /// Whether the background state sweeper is running
    #[must_use]
    pub fn sweeper_running(&self) -> bool {
        self.sweeper.is_running()
    }
}
