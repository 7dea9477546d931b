//! Gateway call-site types

use crate::budget::Reservation;
use crate::error::GatewayError;
use crate::loop_detector::LoopDetection;
use crate::rate_limiter::RateLimitStatus;
use serde::{Deserialize, Serialize};
use tollgate_llm::{CostEstimate, ProviderName, RoutingDecision, SelectionCriteria, TokenUsage};

/// Optional scoping for a preflight check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightOptions {
    /// Budget to reserve the estimated cost against
    pub budget_id: Option<String>,
    /// Named route to select with
    pub route_id: Option<String>,
    /// Extra candidate filters
    pub criteria: Option<SelectionCriteria>,
    /// Conversation to run loop detection for
    pub conversation_id: Option<String>,
}

impl PreflightOptions {
    /// Scope to a budget
    #[must_use]
    pub fn with_budget(mut self, budget_id: impl Into<String>) -> Self {
        self.budget_id = Some(budget_id.into());
        self
    }

    /// Select through a named route
    #[must_use]
    pub fn with_route(mut self, route_id: impl Into<String>) -> Self {
        self.route_id = Some(route_id.into());
        self
    }

    /// Narrow the candidate set
    #[must_use]
    pub fn with_criteria(mut self, criteria: SelectionCriteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    /// Enable loop detection for a conversation
    #[must_use]
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Outcome of a preflight check
///
/// Policy rejections come back here with `allowed == false`; only
/// configuration errors are returned as `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightResult {
    /// Whether the caller may contact the provider
    pub allowed: bool,
    /// Id to quote in the completion or failure report
    pub request_id: String,
    /// Selected provider/model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<RoutingDecision>,
    /// Cost estimate for the selected model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<CostEstimate>,
    /// Rate-limit status at check time
    pub rate_limit_status: RateLimitStatus,
    /// Budget hold taken for this request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
    /// Rejection details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
    /// Loop flagged with a warn action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<LoopDetection>,
}

impl PreflightResult {
    pub(crate) fn rejected(
        request_id: String,
        rate_limit_status: RateLimitStatus,
        error: GatewayError,
    ) -> Self {
        Self {
            allowed: false,
            request_id,
            decision: None,
            estimate: None,
            rate_limit_status,
            reservation: None,
            error: Some(error),
            warning: None,
        }
    }
}

/// Facts about a finished provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    /// Id from the preflight result
    pub request_id: String,
    /// Provider that served the call
    pub provider: ProviderName,
    /// Model that served the call
    pub model: String,
    /// Token counts reported by the provider
    pub usage: TokenUsage,
    /// Observed latency
    pub latency_ms: u64,
    /// Budget to charge when the preflight made no reservation
    #[serde(default)]
    pub budget_id: Option<String>,
}

/// Facts about a failed provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Id from the preflight result
    pub request_id: String,
    /// Provider that failed
    pub provider: ProviderName,
    /// Model that was requested
    pub model: String,
    /// Failure description
    pub error: String,
    /// Time spent before failing
    pub latency_ms: u64,
}
