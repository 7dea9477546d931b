//! Rate limiting for per-user admission control
//!
//! Each user belongs to a named tier with request, token and concurrency
//! ceilings. Request and token counts live in a fixed one-minute bucket
//! that resets lazily on access; the concurrency count follows in-flight
//! lifetime instead.

use crate::error::{duration_millis, Error, GatewayError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Length of one rate-limit bucket
pub const WINDOW: Duration = Duration::from_secs(60);

/// Tier assigned to users that were never given one
pub const DEFAULT_TIER: &str = "standard";

// ============================================================================
// Configuration
// ============================================================================

/// Ceilings for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Requests per one-minute window
    pub requests_per_minute: u32,
    /// Tokens per one-minute window
    pub tokens_per_minute: u64,
    /// Requests in flight at once
    pub max_concurrent: u32,
}

impl TierLimits {
    /// Create tier limits
    #[must_use]
    pub const fn new(
        requests_per_minute: u32,
        tokens_per_minute: u64,
        max_concurrent: u32,
    ) -> Self {
        Self {
            requests_per_minute,
            tokens_per_minute,
            max_concurrent,
        }
    }
}

/// Tier table plus the tier given to unassigned users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Tier for users with no explicit assignment
    pub default_tier: String,
    /// Tier name to limits
    pub tiers: BTreeMap<String, TierLimits>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let tiers = BTreeMap::from([
            ("free".to_string(), TierLimits::new(10, 10_000, 1)),
            ("standard".to_string(), TierLimits::new(60, 100_000, 5)),
            ("premium".to_string(), TierLimits::new(300, 1_000_000, 20)),
        ]);
        Self {
            default_tier: DEFAULT_TIER.to_string(),
            tiers,
        }
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone)]
struct UserState {
    tier: String,
    requests: u32,
    tokens: u64,
    concurrent: u32,
    window_start: Instant,
}

impl UserState {
    fn new(tier: String, now: Instant) -> Self {
        Self {
            tier,
            requests: 0,
            tokens: 0,
            concurrent: 0,
            window_start: now,
        }
    }

    fn window_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= WINDOW
    }

    fn roll_window(&mut self, now: Instant) {
        if self.window_expired(now) {
            self.requests = 0;
            self.tokens = 0;
            self.window_start = now;
        }
    }
}

/// Admission status for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// User id
    pub user_id: String,
    /// Assigned tier
    pub tier: String,
    /// Whether a new request would be rejected
    pub is_limited: bool,
    /// Requests left in this window
    pub remaining_requests: u32,
    /// Tokens left in this window
    pub remaining_tokens: u64,
    /// Requests in flight
    pub concurrent: u32,
    /// Tier concurrency ceiling
    pub max_concurrent: u32,
    /// Milliseconds until the window resets
    pub reset_after_ms: u64,
    /// Milliseconds to wait before retrying, when limited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl RateLimitStatus {
    /// Retry delay as a duration
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }
}

/// Raw counters for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUsage {
    /// Assigned tier
    pub tier: String,
    /// Requests counted in this window
    pub requests: u32,
    /// Tokens counted in this window
    pub tokens: u64,
    /// Requests in flight
    pub concurrent: u32,
    /// Milliseconds since the window started
    pub window_age_ms: u64,
}

/// Result of the check-and-report helper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitCheck {
    /// Whether a request may proceed
    pub allowed: bool,
    /// Current status
    pub status: RateLimitStatus,
    /// Structured rejection, when not allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
}

// ============================================================================
// Limiter
// ============================================================================

/// Per-user, per-tier rate limiter
///
/// State for each user sits behind its own map entry; users never contend
/// with each other.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    users: DashMap<String, UserState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Create a limiter with a tier table
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            users: DashMap::new(),
        }
    }

    /// Assign a tier
    pub fn set_tier(&self, user_id: &str, tier: &str) -> Result<()> {
        if !self.config.tiers.contains_key(tier) {
            return Err(Error::Configuration(format!("unknown rate limit tier: {tier}")));
        }
        self.users
            .entry(user_id.to_string())
            .and_modify(|s| s.tier = tier.to_string())
            .or_insert_with(|| UserState::new(tier.to_string(), Instant::now()));
        debug!(user_id, tier, "Assigned rate limit tier");
        Ok(())
    }

    /// Tier of a user, or the default tier
    #[must_use]
    pub fn get_tier(&self, user_id: &str) -> String {
        self.users
            .get(user_id)
            .map(|s| s.tier.clone())
            .unwrap_or_else(|| self.config.default_tier.clone())
    }

    /// Limits for a tier
    #[must_use]
    pub fn tier_limits(&self, tier: &str) -> Option<TierLimits> {
        self.config.tiers.get(tier).copied()
    }

    /// Whether a new request would be rejected; does not mutate state
    #[must_use]
    pub fn check_request(&self, user_id: &str) -> RateLimitStatus {
        self.check_request_at(user_id, Instant::now())
    }

    pub(crate) fn check_request_at(&self, user_id: &str, now: Instant) -> RateLimitStatus {
        match self.users.get(user_id) {
            Some(state) => {
                let mut view = state.clone();
                drop(state);
                view.roll_window(now);
                self.status_of(user_id, &view, now)
            }
            None => {
                let view = UserState::new(self.config.default_tier.clone(), now);
                self.status_of(user_id, &view, now)
            }
        }
    }

    /// Count a request that is about to be issued
    ///
    /// Does not enforce limits; check first.
    pub fn consume_request(&self, user_id: &str, tokens: u64) -> RateLimitStatus {
        self.consume_request_at(user_id, tokens, Instant::now())
    }

    pub(crate) fn consume_request_at(
        &self,
        user_id: &str,
        tokens: u64,
        now: Instant,
    ) -> RateLimitStatus {
        let mut state = self.entry(user_id, now);
        state.roll_window(now);
        state.requests = state.requests.saturating_add(1);
        state.tokens = state.tokens.saturating_add(tokens);
        state.concurrent = state.concurrent.saturating_add(1);
        debug!(
            user_id,
            requests = state.requests,
            tokens = state.tokens,
            concurrent = state.concurrent,
            "Consumed request"
        );
        self.status_of(user_id, &state, now)
    }

    /// Mark one in-flight request as finished
    pub fn release_request(&self, user_id: &str) {
        if let Some(mut state) = self.users.get_mut(user_id) {
            state.concurrent = state.concurrent.saturating_sub(1);
        }
    }

    /// Clear every counter for a user and restart the window
    pub fn reset_limits(&self, user_id: &str) {
        if let Some(mut state) = self.users.get_mut(user_id) {
            state.requests = 0;
            state.tokens = 0;
            state.concurrent = 0;
            state.window_start = Instant::now();
            info!(user_id, "Rate limits reset");
        }
    }

    /// Drop idle users, returning how many were removed
    ///
    /// A user is idle once its window has expired with nothing in flight.
    /// Users on a non-default tier keep their assignment.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub(crate) fn cleanup_at(&self, now: Instant) -> usize {
        let initial_count = self.users.len();
        self.users.retain(|_, state| {
            !(state.window_expired(now)
                && state.concurrent == 0
                && state.tier == self.config.default_tier)
        });
        let removed = initial_count.saturating_sub(self.users.len());
        if removed > 0 {
            debug!(removed, "Cleaned up idle rate limit entries");
        }
        removed
    }

    /// Users currently tracked
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    /// Raw counters, if the user has been seen
    #[must_use]
    pub fn status(&self, user_id: &str) -> Option<UserUsage> {
        let now = Instant::now();
        self.users.get(user_id).map(|s| {
            let mut view = s.clone();
            view.roll_window(now);
            UserUsage {
                tier: view.tier,
                requests: view.requests,
                tokens: view.tokens,
                concurrent: view.concurrent,
                window_age_ms: duration_millis(now.saturating_duration_since(view.window_start)),
            }
        })
    }

    /// Check without consuming and report a structured rejection
    #[must_use]
    pub fn check(&self, user_id: &str) -> RateLimitCheck {
        let status = self.check_request(user_id);
        let error = status
            .retry_after()
            .filter(|_| status.is_limited)
            .map(GatewayError::rate_limited);
        RateLimitCheck {
            allowed: !status.is_limited,
            status,
            error,
        }
    }

    /// Atomically check and consume, returning a guard for the slot
    ///
    /// The concurrency slot is released when the guard drops.
    pub fn acquire(&self, user_id: &str, tokens: u64) -> Result<ConcurrencySlot<'_>> {
        let now = Instant::now();
        let mut state = self.entry(user_id, now);
        state.roll_window(now);

        let status = self.status_of(user_id, &state, now);
        if status.is_limited {
            let retry_after = status.retry_after().unwrap_or(WINDOW);
            debug!(user_id, retry_after_ms = duration_millis(retry_after), "Rate limited");
            return Err(Error::RateLimited { retry_after });
        }

        state.requests = state.requests.saturating_add(1);
        state.tokens = state.tokens.saturating_add(tokens);
        state.concurrent = state.concurrent.saturating_add(1);
        drop(state);

        Ok(ConcurrencySlot {
            limiter: self,
            user_id: user_id.to_string(),
        })
    }

    /// Run an operation inside a concurrency slot
    ///
    /// Rejects without invoking `op` when limited. The slot is released on
    /// every exit path, including cancellation and panics.
    pub async fn execute<F, Fut, T>(&self, user_id: &str, tokens: u64, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.acquire(user_id, tokens)?;
        Ok(op().await)
    }

    fn entry(
        &self,
        user_id: &str,
        now: Instant,
    ) -> dashmap::mapref::one::RefMut<'_, String, UserState> {
        self.users
            .entry(user_id.to_string())
            .or_insert_with(|| UserState::new(self.config.default_tier.clone(), now))
    }

    fn status_of(&self, user_id: &str, state: &UserState, now: Instant) -> RateLimitStatus {
        // Unknown tiers fall back to the default tier's limits
        let limits = self
            .config
            .tiers
            .get(&state.tier)
            .or_else(|| self.config.tiers.get(&self.config.default_tier))
            .copied()
            .unwrap_or(TierLimits::new(0, 0, 0));

        let is_limited = state.requests >= limits.requests_per_minute
            || state.tokens >= limits.tokens_per_minute
            || state.concurrent >= limits.max_concurrent;
        let reset_after = if state.window_expired(now) {
            WINDOW
        } else {
            WINDOW.saturating_sub(now.saturating_duration_since(state.window_start))
        };
        let reset_after_ms = duration_millis(reset_after).max(1);

        RateLimitStatus {
            user_id: user_id.to_string(),
            tier: state.tier.clone(),
            is_limited,
            remaining_requests: limits.requests_per_minute.saturating_sub(state.requests),
            remaining_tokens: limits.tokens_per_minute.saturating_sub(state.tokens),
            concurrent: state.concurrent,
            max_concurrent: limits.max_concurrent,
            reset_after_ms,
            retry_after_ms: is_limited.then_some(reset_after_ms),
        }
    }
}

/// In-flight request slot; releases its concurrency count on drop
#[derive(Debug)]
pub struct ConcurrencySlot<'a> {
    limiter: &'a RateLimiter,
    user_id: String,
}

impl ConcurrencySlot<'_> {
    /// User holding the slot
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Drop for ConcurrencySlot<'_> {
    fn drop(&mut self) {
        self.limiter.release_request(&self.user_id);
    }
}

#[cfg(test)]
mod tests;
