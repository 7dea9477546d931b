//! EventBus - broadcast-based gateway notifications
//!
//! Budget, rate-limit, loop and provider-health signals are published here.
//! Delivery is in-process and best-effort: a slow subscriber lags rather
//! than blocking the publisher.

use crate::loop_detector::{LoopAction, LoopType};
use serde::Serialize;
use tokio::sync::broadcast;
use tollgate_llm::{HealthStatus, ProviderName};

/// Default channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Events emitted by the gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Spend crossed an alert threshold for the first time this period
    BudgetWarning {
        /// Budget id
        budget_id: String,
        /// Threshold percentage that was crossed
        threshold: f64,
        /// Current percentage used
        percent_used: f64,
    },
    /// Spend reached the budget limit
    BudgetExceeded {
        /// Budget id
        budget_id: String,
        /// Spent this period, in cents
        spent_cents: f64,
        /// Effective limit this period, in cents
        limit_cents: f64,
    },
    /// A preflight check was rejected by the rate limiter
    RateLimited {
        /// User id
        user_id: String,
        /// Milliseconds until the window resets
        retry_after_ms: u64,
    },
    /// A conversation was flagged as looping
    LoopDetected {
        /// Conversation id
        conversation_id: String,
        /// Which signal fired
        loop_type: LoopType,
        /// Detection confidence
        confidence: f64,
        /// Suggested action
        action: LoopAction,
    },
    /// Provider crossed the degraded error threshold
    ProviderDegraded {
        /// Provider
        provider: ProviderName,
        /// Error count at the transition
        error_count: u32,
    },
    /// Provider crossed the unavailable error threshold
    ProviderUnavailable {
        /// Provider
        provider: ProviderName,
        /// Error count at the transition
        error_count: u32,
    },
}

impl GatewayEvent {
    /// Event for a provider health transition, if it is one worth publishing
    #[must_use]
    pub fn for_transition(
        provider: ProviderName,
        status: HealthStatus,
        error_count: u32,
    ) -> Option<Self> {
        match status {
            HealthStatus::Degraded => Some(Self::ProviderDegraded {
                provider,
                error_count,
            }),
            HealthStatus::Unavailable => Some(Self::ProviderUnavailable {
                provider,
                error_count,
            }),
            HealthStatus::Unknown => None,
        }
    }

    /// Event name, matching the serialized `type` tag
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BudgetWarning { .. } => "budget_warning",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::RateLimited { .. } => "rate_limited",
            Self::LoopDetected { .. } => "loop_detected",
            Self::ProviderDegraded { .. } => "provider_degraded",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
        }
    }
}

/// Broadcast-based event bus
///
/// Clones share one channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: GatewayEvent) -> usize {
        // send() fails only when nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of active subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
