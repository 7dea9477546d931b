//! CLI commands: `tollgate models|providers|routes|estimate`

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tollgate_core::llm::{CompletionRequest, ModelTier, ProviderName};
use tollgate_core::{Gateway, GatewayConfig};

/// Read a JSON completion request from disk
pub fn read_request(path: &str) -> Result<CompletionRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid request JSON in {path}"))
}

/// Print the model catalog
pub fn models(config: GatewayConfig, provider: Option<&str>, json: bool) -> Result<()> {
    let gateway = Gateway::new(config)?;
    let provider: Option<ProviderName> = provider.map(str::parse::<ProviderName>).transpose()?;

    let mut models: Vec<_> = gateway
        .registry()
        .get_all_models()
        .into_iter()
        .filter(|m| provider.map_or(true, |p| m.provider == p))
        .collect();
    models.sort_by(|a, b| a.provider.cmp(&b.provider).then_with(|| a.id.cmp(&b.id)));

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!();
    println!(
        "  {:<30} {:<11} {:<13} {:>10} {:>10}  Routable",
        "Model", "Provider", "Tier", "In c/1K", "Out c/1K"
    );
    println!("  {}", "-".repeat(88));
    for model in &models {
        let routable = model.enabled && gateway.registry().is_routable(model.provider);
        println!(
            "  {:<30} {:<11} {:<13} {:>10.4} {:>10.4}  {}",
            model.id,
            model.provider.as_str(),
            format!("{:?}", model.tier),
            model.input_cost_per_token_cents() * 1_000.0,
            model.output_cost_per_token_cents() * 1_000.0,
            if routable { "yes" } else { "no" }
        );
    }

    let tiers: BTreeSet<ModelTier> = models.iter().map(|m| m.tier).collect();
    if !tiers.is_empty() {
        println!();
        for tier in tiers {
            println!("  {:<13} {}", format!("{tier:?}"), tier.price_range());
        }
    }
    println!();
    Ok(())
}

/// Print configured providers with their health
pub fn providers(config: GatewayConfig) -> Result<()> {
    let gateway = Gateway::new(config)?;

    println!();
    println!(
        "  {:<12} {:<9} {:<12} {:>7}  Capabilities",
        "Provider", "Enabled", "Health", "Errors"
    );
    println!("  {}", "-".repeat(80));
    for (name, health) in gateway.registry().health_snapshot() {
        let Some(provider) = gateway.registry().get_provider(name) else {
            continue;
        };
        let capabilities: Vec<String> = provider
            .capabilities
            .iter()
            .map(|c| format!("{c:?}"))
            .collect();
        println!(
            "  {:<12} {:<9} {:<12} {:>7}  {}",
            name.as_str(),
            provider.enabled,
            health.status.to_string(),
            health.error_count,
            capabilities.join(", ")
        );
    }
    println!();
    Ok(())
}

/// Print named routes
pub fn routes(config: GatewayConfig) -> Result<()> {
    let gateway = Gateway::new(config)?;
    let routes = gateway.router().list_routes();
    if routes.is_empty() {
        println!("No routes configured; requests use the cost-optimized default.");
        return Ok(());
    }
    for route in routes {
        println!(
            "{:<16} {:<18} enabled={} chain=[{}]",
            route.id,
            route.strategy.to_string(),
            route.enabled,
            route.fallback_chain.join(", ")
        );
    }
    Ok(())
}

/// Print a cost estimate for a request file
pub fn estimate(config: GatewayConfig, path: &str, model: Option<&str>) -> Result<()> {
    let gateway = Gateway::new(config)?;
    let request = read_request(path)?;
    let estimate = gateway.estimator().estimate(&request, model);
    println!("{}", serde_json::to_string_pretty(&estimate)?);
    Ok(())
}
