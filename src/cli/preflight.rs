//! CLI command: `tollgate preflight`
//!
//! Builds a fresh gateway, optionally creates a budget and assigns a tier,
//! then prints the preflight result as JSON.

use super::catalog::read_request;
use anyhow::{Context, Result};
use clap::Args;
use tollgate_core::{BudgetOptions, BudgetPeriod, Gateway, GatewayConfig, PreflightOptions};
use tracing::info;

/// Arguments for `tollgate preflight`
#[derive(Args, Debug)]
pub struct PreflightArgs {
    /// Caller id
    #[arg(long)]
    pub user: String,
    /// JSON completion request
    #[arg(long)]
    pub request: String,
    /// Rate-limit tier for the caller
    #[arg(long)]
    pub tier: Option<String>,
    /// Named route
    #[arg(long)]
    pub route: Option<String>,
    /// Create a monthly hard budget with this limit (cents) and scope to it
    #[arg(long)]
    pub budget_limit: Option<f64>,
    /// Conversation id for loop detection
    #[arg(long)]
    pub conversation: Option<String>,
}

/// Run the preflight subcommand
pub async fn run(config: GatewayConfig, args: PreflightArgs) -> Result<()> {
    let gateway = Gateway::new(config)?;
    gateway.initialize().await?;

    let request = read_request(&args.request)?;
    if let Some(tier) = args.tier.as_deref() {
        gateway.rate_limiter().set_tier(&args.user, tier)?;
    }

    let mut options = PreflightOptions {
        route_id: args.route,
        conversation_id: args.conversation,
        ..PreflightOptions::default()
    };
    if let Some(limit) = args.budget_limit {
        let budget = gateway
            .budgets()
            .create_budget(
                &format!("{}-cli", args.user),
                limit,
                BudgetPeriod::Monthly,
                BudgetOptions {
                    hard_limit: true,
                    ..BudgetOptions::default()
                },
            )
            .await
            .context("Failed to create budget")?;
        info!(budget_id = %budget.id, "Created CLI budget");
        options.budget_id = Some(budget.id);
    }

    let result = gateway
        .preflight_check(&args.user, &request, options)
        .await
        .context("Preflight failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    gateway.shutdown().await;
    Ok(())
}
