//! Tollgate Core - Admission control for the LLM gateway
//!
//! This crate decides, before any provider is called, whether a request may
//! proceed and records what it cost afterwards:
//! - Budgets: spend limits with alerts, rollover and atomic reservations
//! - Usage: per-request records and summaries
//! - Rate limiting: per-tier request, token and concurrency ceilings
//! - Loop detection: exact, near-duplicate and pattern signals
//! - Health: optional background provider probing
//! - Cleanup: periodic eviction of idle per-key state
//! - Gateway: the facade composing all of the above

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod budget;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod gateway;
pub mod health;
pub mod loop_detector;
pub mod rate_limiter;
pub mod usage;

pub use budget::{
    Budget, BudgetManager, BudgetOptions, BudgetPeriod, BudgetStatus, BudgetStore, BudgetUpdate,
    InMemoryBudgetStore, Reservation,
};
pub use cleanup::{CleanupConfig, CleanupReport, StateSweeper};
pub use config::GatewayConfig;
pub use error::{Error, ErrorCode, GatewayError, Result};
pub use event_bus::{EventBus, GatewayEvent, DEFAULT_EVENT_CAPACITY};
pub use gateway::{CompletionReport, FailureReport, Gateway, PreflightOptions, PreflightResult};
pub use health::{HealthCheckConfig, HealthChecker, HealthProbe};
pub use loop_detector::{
    LoopAction, LoopDetection, LoopDetectionConfig, LoopDetector, LoopPattern, LoopType,
    MatchType,
};
pub use rate_limiter::{
    ConcurrencySlot, RateLimitCheck, RateLimitConfig, RateLimitStatus, RateLimiter, TierLimits,
    UserUsage,
};
pub use usage::{
    InMemoryUsageStore, UsageBreakdown, UsageFilter, UsageRecord, UsageStore, UsageSummary,
    UsageTracker,
};

/// Re-export of the routing and pricing layer
pub use tollgate_llm as llm;
