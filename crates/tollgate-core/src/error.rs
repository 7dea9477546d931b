//! Error types for tollgate-core
//!
//! `Error` is raised for misconfiguration and store failures. Policy
//! rejections (rate limited, budget exceeded, loop detected) are not errors
//! to the caller; they travel as a [`GatewayError`] value inside the
//! preflight result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Registry or routing error
    #[error("llm error: {0}")]
    Llm(#[from] tollgate_llm::Error),

    /// Budget id is not known
    #[error("budget not found: {0}")]
    BudgetNotFound(String),

    /// Budget definition is invalid
    #[error("invalid budget: {0}")]
    InvalidBudget(String),

    /// No reservation is held under this request id
    #[error("reservation not found: {0}")]
    ReservationNotFound(String),

    /// Loop pattern could not be compiled or is malformed
    #[error("invalid pattern {id}: {message}")]
    InvalidPattern {
        /// Pattern id
        id: String,
        /// Detailed message
        message: String,
    },

    /// Budget or usage store failure
    #[error("store error: {0}")]
    Store(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded, retry after {}ms", retry_after.as_millis())]
    RateLimited {
        /// Time until the current window resets
        retry_after: Duration,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Structured gateway error
// ============================================================================

/// Machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Caller exceeded its tier's limits
    RateLimited,
    /// Hard budget would be exceeded
    BudgetExceeded,
    /// Explicit model is not in the catalog
    ModelNotFound,
    /// No model survived candidate filtering
    NoAvailableModel,
    /// Provider for the requested model is unavailable
    ProviderUnavailable,
    /// Conversation is looping and the matching rule says stop
    LoopDetected,
    /// Malformed input or unknown identifiers
    InvalidRequest,
    /// Store or other internal failure
    InternalError,
}

impl ErrorCode {
    /// HTTP-style status code
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimited => 429,
            Self::BudgetExceeded => 402,
            Self::ModelNotFound => 404,
            Self::NoAvailableModel | Self::ProviderUnavailable => 503,
            Self::LoopDetected => 409,
            Self::InvalidRequest => 400,
            Self::InternalError => 500,
        }
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::BudgetExceeded => "BUDGET_EXCEEDED",
            Self::ModelNotFound => "MODEL_NOT_FOUND",
            Self::NoAvailableModel => "NO_AVAILABLE_MODEL",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::LoopDetected => "LOOP_DETECTED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error value returned to gateway callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// HTTP-style status code
    pub status_code: u16,
    /// Milliseconds until a retry may succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Provider involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl GatewayError {
    /// Create an error with the code's default status
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status_code: code.status_code(),
            retry_after_ms: None,
            provider: None,
        }
    }

    /// Rate limited, retry after the given delay
    #[must_use]
    pub fn rate_limited(retry_after: Duration) -> Self {
        let mut err = Self::new(
            ErrorCode::RateLimited,
            format!("rate limit exceeded, retry after {}ms", retry_after.as_millis()),
        );
        err.retry_after_ms = Some(duration_millis(retry_after));
        err
    }

    /// Hard budget would be exceeded
    #[must_use]
    pub fn budget_exceeded(budget_id: &str, remaining_cents: f64, requested_cents: f64) -> Self {
        Self::new(
            ErrorCode::BudgetExceeded,
            format!(
                "budget {budget_id} has {remaining_cents:.4} cents remaining, \
                 request needs {requested_cents:.4}"
            ),
        )
    }

    /// Conversation loop with a stop action
    #[must_use]
    pub fn loop_detected(conversation_id: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::LoopDetected,
            format!("conversation {conversation_id} is looping: {reason}"),
        )
    }

    /// Attach a provider name
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<&Error> for GatewayError {
    fn from(err: &Error) -> Self {
        use tollgate_llm::Error as LlmError;

        match err {
            Error::Llm(LlmError::ModelNotFound(_)) => {
                Self::new(ErrorCode::ModelNotFound, err.to_string())
            }
            Error::Llm(LlmError::NoAvailableModel(_)) => {
                Self::new(ErrorCode::NoAvailableModel, err.to_string())
            }
            Error::Llm(LlmError::ProviderUnavailable { provider, .. }) => {
                Self::new(ErrorCode::ProviderUnavailable, err.to_string())
                    .with_provider(provider.clone())
            }
            Error::Llm(_)
            | Error::BudgetNotFound(_)
            | Error::InvalidBudget(_)
            | Error::ReservationNotFound(_)
            | Error::InvalidPattern { .. }
            | Error::Configuration(_) => Self::new(ErrorCode::InvalidRequest, err.to_string()),
            Error::RateLimited { retry_after } => Self::rate_limited(*retry_after),
            Error::Store(_) => Self::new(ErrorCode::InternalError, err.to_string()),
        }
    }
}

impl From<Error> for GatewayError {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_format() {
        let json = serde_json::to_string(&ErrorCode::NoAvailableModel).unwrap();
        assert_eq!(json, "\"NO_AVAILABLE_MODEL\"");
        assert_eq!(ErrorCode::RateLimited.status_code(), 429);
        assert_eq!(ErrorCode::BudgetExceeded.status_code(), 402);
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let err = GatewayError::rate_limited(Duration::from_secs(12));
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert_eq!(err.status_code, 429);
        assert_eq!(err.retry_after_ms, Some(12_000));
    }

    #[test]
    fn test_from_core_error() {
        let err = Error::Llm(tollgate_llm::Error::ProviderUnavailable {
            provider: "groq".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
        });
        let gateway: GatewayError = (&err).into();
        assert_eq!(gateway.code, ErrorCode::ProviderUnavailable);
        assert_eq!(gateway.provider.as_deref(), Some("groq"));

        let gateway: GatewayError = Error::BudgetNotFound("team".to_string()).into();
        assert_eq!(gateway.code, ErrorCode::InvalidRequest);
        assert_eq!(gateway.status_code, 400);
    }
}
