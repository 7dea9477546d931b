//! Model router implementation
//!
//! This module contains the ModelRouter, which picks a provider/model for a
//! request from the registry's routable models using a route's strategy.

use super::types::{Route, RoutingDecision, RoutingStrategy, SelectionCriteria};
use crate::completion::CompletionRequest;
use crate::cost::{CostEstimate, CostEstimator};
use crate::error::{Error, Result};
use crate::registry::{ModelInfo, ProviderRegistry};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Route plus its round-robin cursor
#[derive(Debug)]
struct RouteEntry {
    route: Route,
    cursor: AtomicUsize,
}

/// Strategy-based model selection with named routes and fallback chains
#[derive(Debug)]
pub struct ModelRouter {
    registry: Arc<ProviderRegistry>,
    estimator: Arc<CostEstimator>,
    routes: DashMap<String, RouteEntry>,
}

impl ModelRouter {
    /// Create a router over a registry and estimator
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, estimator: Arc<CostEstimator>) -> Self {
        Self {
            registry,
            estimator,
            routes: DashMap::new(),
        }
    }

    // ========================================================================
    // Routes
    // ========================================================================

    /// Register (or replace) a route
    ///
    /// Fallback chain entries must exist in the catalog. Replacing a route
    /// restarts its round-robin cursor.
    pub fn register_route(&self, route: Route) -> Result<()> {
        if route.id.trim().is_empty() {
            return Err(Error::InvalidRoute {
                id: route.id,
                message: "route id must not be empty".to_string(),
            });
        }
        if let Some(missing) = route
            .fallback_chain
            .iter()
            .find(|id| self.registry.get_model(id).is_none())
        {
            return Err(Error::InvalidRoute {
                id: route.id.clone(),
                message: format!("fallback chain references unknown model {missing}"),
            });
        }

        debug!(route = %route.id, strategy = %route.strategy, "Registering route");
        self.routes.insert(
            route.id.clone(),
            RouteEntry {
                route,
                cursor: AtomicUsize::new(0),
            },
        );
        Ok(())
    }

    /// Get a route by id
    #[must_use]
    pub fn get_route(&self, id: &str) -> Option<Route> {
        self.routes.get(id).map(|e| e.route.clone())
    }

    /// Remove a route, returning whether it existed
    pub fn remove_route(&self, id: &str) -> bool {
        self.routes.remove(id).is_some()
    }

    /// All routes, ordered by id
    #[must_use]
    pub fn list_routes(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self.routes.iter().map(|e| e.route.clone()).collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Select a provider/model for a request
    #[instrument(skip(self, request, criteria))]
    pub fn select_model(
        &self,
        request: &CompletionRequest,
        route_id: Option<&str>,
        criteria: Option<&SelectionCriteria>,
    ) -> Result<RoutingDecision> {
        if let Some(model_id) = request.model.as_deref() {
            return self.select_explicit(request, model_id);
        }

        let route = self.resolve_route(route_id)?;
        let named = route_id == Some(route.id.as_str());
        let candidates = self.candidates(request, criteria, None);
        self.apply_strategy(request, &route, named, candidates)
    }

    /// Re-run selection without a model that just failed
    ///
    /// When the route defines a fallback chain, the chain entry after the
    /// failed model is preferred over re-deriving by strategy.
    #[instrument(skip(self, request))]
    pub fn get_fallback(
        &self,
        failed_model_id: &str,
        request: &CompletionRequest,
        route_id: Option<&str>,
    ) -> Result<RoutingDecision> {
        let route = self.resolve_route(route_id)?;
        let named = route_id == Some(route.id.as_str());
        let candidates = self.candidates(request, None, Some(failed_model_id));

        if let Some(pos) = route
            .fallback_chain
            .iter()
            .position(|id| id == failed_model_id)
        {
            let next = route.fallback_chain[pos + 1..]
                .iter()
                .find_map(|id| candidates.iter().find(|m| &m.id == id));
            if let Some(model) = next {
                info!(
                    failed = failed_model_id,
                    model = %model.id,
                    route = %route.id,
                    "Selected next fallback chain entry"
                );
                return Ok(self.decision(
                    request,
                    model,
                    format!("Fallback chain entry after {failed_model_id}"),
                    &route,
                    named,
                    None,
                ));
            }
        }

        self.apply_strategy(request, &route, named, candidates)
    }

    fn select_explicit(
        &self,
        request: &CompletionRequest,
        model_id: &str,
    ) -> Result<RoutingDecision> {
        let model = self
            .registry
            .get_model(model_id)
            .ok_or_else(|| Error::ModelNotFound(model_id.to_string()))?;
        if !self.registry.is_routable(model.provider) {
            return Err(Error::ProviderUnavailable {
                provider: model.provider.to_string(),
                model: model.id,
            });
        }

        debug!(model = %model.id, "Explicit model requested");
        Ok(RoutingDecision {
            model: model.id.clone(),
            provider: model.provider,
            tier: model.tier,
            reason: "Explicit model requested".to_string(),
            route_id: None,
            strategy: None,
            estimate: Some(self.estimator.estimate(request, Some(&model.id))),
        })
    }

    fn resolve_route(&self, route_id: Option<&str>) -> Result<Route> {
        match route_id {
            Some(id) => {
                let route = self
                    .get_route(id)
                    .ok_or_else(|| Error::RouteNotFound(id.to_string()))?;
                if route.enabled {
                    Ok(route)
                } else {
                    debug!(route = id, "Route disabled, using default route");
                    Ok(Route::implicit_default())
                }
            }
            None => Ok(Route::implicit_default()),
        }
    }

    /// Routable models serving the request, ordered by id
    fn candidates(
        &self,
        request: &CompletionRequest,
        criteria: Option<&SelectionCriteria>,
        exclude: Option<&str>,
    ) -> Vec<ModelInfo> {
        let required = request.effective_capabilities();
        self.registry
            .routable_models()
            .into_iter()
            .filter(|m| Some(m.id.as_str()) != exclude)
            .filter(|m| m.has_all(&required))
            .filter(|m| criteria.map(|c| c.matches(m)).unwrap_or(true))
            .collect()
    }

    fn apply_strategy(
        &self,
        request: &CompletionRequest,
        route: &Route,
        named: bool,
        candidates: Vec<ModelInfo>,
    ) -> Result<RoutingDecision> {
        if candidates.is_empty() {
            return Err(Error::NoAvailableModel(format!(
                "no enabled model on an available provider matches route {}",
                route.id
            )));
        }

        let decision = match route.strategy {
            RoutingStrategy::CostOptimized => {
                let (model, estimate) = self.cheapest(request, &candidates)?;
                self.decision(
                    request,
                    model,
                    "Lowest cost model".to_string(),
                    route,
                    named,
                    Some(estimate),
                )
            }
            RoutingStrategy::QualityOptimized => {
                let model = candidates
                    .iter()
                    .min_by(|a, b| {
                        b.tier.cmp(&a.tier).then_with(|| {
                            let a_price = a.input_cost_per_million + a.output_cost_per_million;
                            let b_price = b.input_cost_per_million + b.output_cost_per_million;
                            a_price.total_cmp(&b_price)
                        })
                    })
                    .unwrap_or(&candidates[0]);
                self.decision(
                    request,
                    model,
                    "Highest quality model".to_string(),
                    route,
                    named,
                    None,
                )
            }
            RoutingStrategy::RoundRobin => {
                let cursor = self
                    .routes
                    .get(&route.id)
                    .map(|e| e.cursor.fetch_add(1, Ordering::Relaxed))
                    .unwrap_or(0);
                let index = cursor % candidates.len();
                self.decision(
                    request,
                    &candidates[index],
                    format!("Round robin selection {} of {}", index + 1, candidates.len()),
                    route,
                    named,
                    None,
                )
            }
            RoutingStrategy::Failover => {
                let chained = route
                    .fallback_chain
                    .iter()
                    .enumerate()
                    .find_map(|(i, id)| candidates.iter().find(|m| &m.id == id).map(|m| (i, m)));
                match chained {
                    Some((i, model)) => self.decision(
                        request,
                        model,
                        format!("Failover chain entry {}", i + 1),
                        route,
                        named,
                        None,
                    ),
                    None => {
                        let (model, estimate) = self.cheapest(request, &candidates)?;
                        self.decision(
                            request,
                            model,
                            "Failover chain exhausted; lowest cost model".to_string(),
                            route,
                            named,
                            Some(estimate),
                        )
                    }
                }
            }
        };

        info!(
            model = %decision.model,
            provider = %decision.provider,
            strategy = %route.strategy,
            reason = %decision.reason,
            "Selected model"
        );
        Ok(decision)
    }

    /// Lowest estimated cost; ties go to the lower model id
    fn cheapest<'a>(
        &self,
        request: &CompletionRequest,
        candidates: &'a [ModelInfo],
    ) -> Result<(&'a ModelInfo, CostEstimate)> {
        let mut best: Option<(&ModelInfo, CostEstimate)> = None;
        for model in candidates {
            let estimate = self.estimator.estimate(request, Some(&model.id));
            let better = match &best {
                None => true,
                Some((current, current_est)) => estimate
                    .estimated_cost_cents
                    .total_cmp(&current_est.estimated_cost_cents)
                    .then_with(|| model.id.cmp(&current.id))
                    .is_lt(),
            };
            if better {
                best = Some((model, estimate));
            }
        }
        best.ok_or_else(|| Error::NoAvailableModel("no candidate models".to_string()))
    }

    fn decision(
        &self,
        request: &CompletionRequest,
        model: &ModelInfo,
        reason: String,
        route: &Route,
        named: bool,
        estimate: Option<CostEstimate>,
    ) -> RoutingDecision {
        RoutingDecision {
            model: model.id.clone(),
            provider: model.provider,
            tier: model.tier,
            reason,
            route_id: named.then(|| route.id.clone()),
            strategy: Some(route.strategy),
            estimate: Some(
                estimate.unwrap_or_else(|| self.estimator.estimate(request, Some(&model.id))),
            ),
        }
    }
}
