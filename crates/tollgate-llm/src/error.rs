//! Error types for tollgate-llm

use thiserror::Error;

/// Registry and routing error type
///
/// These are configuration errors: retrying the same call cannot fix them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Provider name is not part of the supported set
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider is supported but was never registered
    #[error("provider not registered: {0}")]
    ProviderNotRegistered(String),

    /// Model id is not in the catalog
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Provider owning the requested model is unavailable
    #[error("provider unavailable: {provider}")]
    ProviderUnavailable {
        /// Provider name
        provider: String,
        /// Model that was requested
        model: String,
    },

    /// No candidate model survived filtering
    #[error("no available model: {0}")]
    NoAvailableModel(String),

    /// Route id is not registered
    #[error("route not found: {0}")]
    RouteNotFound(String),

    /// Route definition is invalid
    #[error("invalid route {id}: {message}")]
    InvalidRoute {
        /// Route id
        id: String,
        /// Detailed message
        message: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
