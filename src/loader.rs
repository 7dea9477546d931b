//! Configuration loading
//!
//! Embedded defaults, then optional files, then environment variables.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use tollgate_core::GatewayConfig;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Load and validate the gateway configuration
pub fn load_config(path: Option<&str>) -> Result<GatewayConfig> {
    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(
            File::with_name(&format!(
                "config/{}",
                std::env::var("TOLLGATE_ENV").unwrap_or_else(|_| "development".to_string())
            ))
            .required(false),
        )
        .add_source(File::with_name("config/local").required(false));

    if let Some(path) = path {
        builder = builder.add_source(File::with_name(path).required(true));
    }

    // TOLLGATE_RATE_LIMITS__DEFAULT_TIER maps to rate_limits.default_tier
    let config = builder
        .add_source(
            Environment::with_prefix("TOLLGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let gateway: GatewayConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;
    gateway.validate().context("Invalid configuration")?;
    Ok(gateway)
}
