//! Tests for router module

use super::*;
use crate::completion::CompletionRequest;
use crate::cost::CostEstimator;
use crate::error::Error;
use crate::message::Message;
use crate::registry::{Capability, ModelTier, ProviderConfig, ProviderName, ProviderRegistry};
use crate::tools::ToolDefinition;
use std::sync::Arc;

fn setup() -> (Arc<ProviderRegistry>, ModelRouter) {
    let registry = Arc::new(ProviderRegistry::new());
    for name in ["openai", "anthropic", "deepseek"] {
        registry
            .register_provider(ProviderConfig::new(
                name,
                vec![Capability::Chat, Capability::FunctionCalling],
            ))
            .unwrap();
    }
    let estimator = Arc::new(CostEstimator::new(Arc::clone(&registry)));
    let router = ModelRouter::new(Arc::clone(&registry), estimator);
    (registry, router)
}

fn request() -> CompletionRequest {
    CompletionRequest::new().with_message(Message::user("Draft a short status update."))
}

fn with_tools(req: CompletionRequest) -> CompletionRequest {
    req.with_tools(vec![ToolDefinition::new(
        "get_weather",
        "Current weather for a city",
        serde_json::json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    )])
}

fn mark_unavailable(registry: &ProviderRegistry, name: ProviderName) {
    for _ in 0..5 {
        registry.record_error(name).unwrap();
    }
}

#[test]
fn test_default_route_is_cost_optimized() {
    let (_, router) = setup();
    let decision = router.select_model(&request(), None, None).unwrap();

    assert_eq!(decision.model, "deepseek-chat");
    assert_eq!(decision.provider, ProviderName::DeepSeek);
    assert_eq!(decision.strategy, Some(RoutingStrategy::CostOptimized));
    assert!(decision.route_id.is_none());
    assert!(decision.estimate.is_some());
}

#[test]
fn test_explicit_model_bypasses_strategy() {
    let (_, router) = setup();
    let req = request().with_model("claude-sonnet-4-5-20250929");
    let decision = router.select_model(&req, None, None).unwrap();

    assert_eq!(decision.model, "claude-sonnet-4-5-20250929");
    assert_eq!(decision.provider, ProviderName::Anthropic);
    assert_eq!(decision.tier, ModelTier::Standard);
    assert!(decision.strategy.is_none());
    assert_eq!(decision.reason, "Explicit model requested");
}

#[test]
fn test_explicit_unknown_model() {
    let (_, router) = setup();
    let err = router
        .select_model(&request().with_model("gpt-17"), None, None)
        .unwrap_err();
    assert_eq!(err, Error::ModelNotFound("gpt-17".to_string()));
}

#[test]
fn test_explicit_model_on_unroutable_provider() {
    let (registry, router) = setup();

    // Gemini never registered
    let err = router
        .select_model(&request().with_model("gemini-2.5-pro"), None, None)
        .unwrap_err();
    assert!(matches!(err, Error::ProviderUnavailable { .. }));

    mark_unavailable(&registry, ProviderName::OpenAi);
    let err = router
        .select_model(&request().with_model("gpt-5"), None, None)
        .unwrap_err();
    assert_eq!(
        err,
        Error::ProviderUnavailable {
            provider: "openai".to_string(),
            model: "gpt-5".to_string(),
        }
    );
}

#[test]
fn test_quality_optimized() {
    let (_, router) = setup();
    router
        .register_route(Route::new("best", RoutingStrategy::QualityOptimized))
        .unwrap();

    // Cheapest premium chat model
    let decision = router.select_model(&request(), Some("best"), None).unwrap();
    assert_eq!(decision.model, "deepseek-reasoner");
    assert_eq!(decision.tier, ModelTier::Premium);
    assert_eq!(decision.route_id.as_deref(), Some("best"));

    // Tools rule out the reasoner
    let decision = router
        .select_model(&with_tools(request()), Some("best"), None)
        .unwrap();
    assert_eq!(decision.model, "gpt-5");
}

#[test]
fn test_round_robin_rotates() {
    let (_, router) = setup();
    router
        .register_route(Route::new("spread", RoutingStrategy::RoundRobin))
        .unwrap();
    let criteria = SelectionCriteria::default().with_providers(vec![ProviderName::DeepSeek]);

    let picks: Vec<String> = (0..3)
        .map(|_| {
            router
                .select_model(&request(), Some("spread"), Some(&criteria))
                .unwrap()
                .model
        })
        .collect();
    assert_eq!(picks, vec!["deepseek-chat", "deepseek-reasoner", "deepseek-chat"]);
}

#[test]
fn test_failover_walks_chain() {
    let (registry, router) = setup();
    router
        .register_route(
            Route::new("primary", RoutingStrategy::Failover)
                .with_fallback_chain(["claude-sonnet-4-5-20250929", "gpt-5"]),
        )
        .unwrap();

    let decision = router.select_model(&request(), Some("primary"), None).unwrap();
    assert_eq!(decision.model, "claude-sonnet-4-5-20250929");

    mark_unavailable(&registry, ProviderName::Anthropic);
    let decision = router.select_model(&request(), Some("primary"), None).unwrap();
    assert_eq!(decision.model, "gpt-5");

    mark_unavailable(&registry, ProviderName::OpenAi);
    let decision = router.select_model(&request(), Some("primary"), None).unwrap();
    assert_eq!(decision.model, "deepseek-chat");
}

#[test]
fn test_get_fallback_prefers_chain() {
    let (_, router) = setup();
    router
        .register_route(
            Route::new("primary", RoutingStrategy::CostOptimized)
                .with_fallback_chain(["claude-sonnet-4-5-20250929", "gpt-5"]),
        )
        .unwrap();

    let decision = router
        .get_fallback("claude-sonnet-4-5-20250929", &request(), Some("primary"))
        .unwrap();
    assert_eq!(decision.model, "gpt-5");
}

#[test]
fn test_get_fallback_excludes_failed_model() {
    let (_, router) = setup();
    let decision = router.get_fallback("deepseek-chat", &request(), None).unwrap();
    assert_ne!(decision.model, "deepseek-chat");
}

#[test]
fn test_criteria_narrow_candidates() {
    let (_, router) = setup();
    let criteria = SelectionCriteria::default().with_min_tier(ModelTier::Standard);
    let decision = router.select_model(&request(), None, Some(&criteria)).unwrap();
    assert!(decision.tier.at_least(ModelTier::Standard));

    let criteria = SelectionCriteria::default().with_capability(Capability::Vision);
    let decision = router.select_model(&request(), None, Some(&criteria)).unwrap();
    assert_ne!(decision.provider, ProviderName::DeepSeek);
}

#[test]
fn test_unknown_route() {
    let (_, router) = setup();
    let err = router
        .select_model(&request(), Some("nope"), None)
        .unwrap_err();
    assert_eq!(err, Error::RouteNotFound("nope".to_string()));
}

#[test]
fn test_disabled_route_uses_default() {
    let (_, router) = setup();
    let mut route = Route::new("best", RoutingStrategy::QualityOptimized);
    route.enabled = false;
    router.register_route(route).unwrap();

    let decision = router.select_model(&request(), Some("best"), None).unwrap();
    assert_eq!(decision.strategy, Some(RoutingStrategy::CostOptimized));
    assert!(decision.route_id.is_none());
}

#[test]
fn test_register_route_validates_chain() {
    let (_, router) = setup();
    let err = router
        .register_route(Route::new("bad", RoutingStrategy::Failover).with_fallback_chain(["nope"]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRoute { .. }));

    let err = router
        .register_route(Route::new("  ", RoutingStrategy::Failover))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRoute { .. }));
}

#[test]
fn test_route_management() {
    let (_, router) = setup();
    router
        .register_route(Route::new("b", RoutingStrategy::RoundRobin))
        .unwrap();
    router
        .register_route(Route::new("a", RoutingStrategy::Failover))
        .unwrap();

    let ids: Vec<String> = router.list_routes().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(
        router.get_route("a").unwrap().strategy,
        RoutingStrategy::Failover
    );
    assert!(router.remove_route("a"));
    assert!(!router.remove_route("a"));
    assert!(router.get_route("a").is_none());
}

#[test]
fn test_no_available_model() {
    let registry = Arc::new(ProviderRegistry::new());
    let estimator = Arc::new(CostEstimator::new(Arc::clone(&registry)));
    let router = ModelRouter::new(registry, estimator);

    let err = router.select_model(&request(), None, None).unwrap_err();
    assert!(matches!(err, Error::NoAvailableModel(_)));
}
