//! CLI module for Tollgate
//!
//! Provides commands:
//! - `models`, `providers`, `routes`: inspect the configured catalog
//! - `estimate`: price a request file
//! - `preflight`: run a full preflight check for a request file

use clap::{Parser, Subcommand};

pub mod catalog;
pub mod preflight;

/// Tollgate LLM gateway CLI
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Admission control and routing for LLM providers")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List catalog models and pricing
    Models {
        /// Only models served by this provider
        #[arg(long)]
        provider: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List configured providers and their health
    Providers,
    /// List named routes
    Routes,
    /// Estimate the cost of a request file
    Estimate {
        /// JSON completion request
        #[arg(long)]
        request: String,
        /// Price against this model instead of the request's
        #[arg(long)]
        model: Option<String>,
    },
    /// Run a preflight check for a request file
    Preflight(preflight::PreflightArgs),
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = crate::loader::load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Models { provider, json }) => {
            catalog::models(config, provider.as_deref(), json)
        }
        Some(Commands::Providers) => catalog::providers(config),
        Some(Commands::Routes) => catalog::routes(config),
        Some(Commands::Estimate { request, model }) => {
            catalog::estimate(config, &request, model.as_deref())
        }
        Some(Commands::Preflight(args)) => preflight::run(config, args).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
