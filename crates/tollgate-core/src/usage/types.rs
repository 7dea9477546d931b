//! Usage records, filters and summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tollgate_llm::TokenUsage;

/// One completed or failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Record id, assigned by the tracker
    pub id: String,
    /// Caller
    pub user_id: String,
    /// Gateway request id
    pub request_id: String,
    /// Provider name
    pub provider: String,
    /// Model id
    pub model: String,
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Prompt + completion tokens
    pub total_tokens: u32,
    /// Cost in cents
    pub cost_cents: f64,
    /// Latency in milliseconds
    pub latency_ms: u64,
    /// Whether the call succeeded
    pub success: bool,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the call finished
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    /// A successful call
    #[must_use]
    pub fn success(
        user_id: impl Into<String>,
        request_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        usage: TokenUsage,
        cost_cents: f64,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            request_id: request_id.into(),
            provider: provider.into(),
            model: model.into(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost_cents,
            latency_ms,
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed call; no tokens and no cost
    #[must_use]
    pub fn failure(
        user_id: impl Into<String>,
        request_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        error: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            request_id: request_id.into(),
            provider: provider.into(),
            model: model.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost_cents: 0.0,
            latency_ms,
            success: false,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    /// Override the timestamp
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Record selection; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageFilter {
    /// Only this user
    pub user_id: Option<String>,
    /// Only this provider
    pub provider: Option<String>,
    /// Only this model
    pub model: Option<String>,
    /// At or after this time
    pub since: Option<DateTime<Utc>>,
    /// Before this time
    pub until: Option<DateTime<Utc>>,
}

impl UsageFilter {
    /// Filter by user
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    /// Restrict to a provider
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Restrict to a model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Restrict to `[since, until)`
    #[must_use]
    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Whether a record passes the filter
    #[must_use]
    pub fn matches(&self, record: &UsageRecord) -> bool {
        self.user_id.as_ref().map_or(true, |u| *u == record.user_id)
            && self.provider.as_ref().map_or(true, |p| *p == record.provider)
            && self.model.as_ref().map_or(true, |m| *m == record.model)
            && self.since.map_or(true, |s| record.timestamp >= s)
            && self.until.map_or(true, |u| record.timestamp < u)
    }
}

/// Per-provider or per-model aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageBreakdown {
    /// Request count
    pub requests: u64,
    /// Total tokens
    pub tokens: u64,
    /// Cost in cents
    pub cost_cents: f64,
}

/// Aggregate usage over a filtered record set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// All requests
    pub total_requests: u64,
    /// Successful requests
    pub successful_requests: u64,
    /// Failed requests
    pub failed_requests: u64,
    /// Total tokens
    pub total_tokens: u64,
    /// Total cost in cents
    pub total_cost_cents: f64,
    /// Mean latency over all requests
    pub average_latency_ms: f64,
    /// Breakdown by provider
    pub by_provider: BTreeMap<String, UsageBreakdown>,
    /// Breakdown by model
    pub by_model: BTreeMap<String, UsageBreakdown>,
}

impl UsageSummary {
    /// Aggregate a set of records
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> Self {
        let mut summary = Self::default();
        let mut total_latency: u128 = 0;

        for record in records {
            summary.total_requests += 1;
            if record.success {
                summary.successful_requests += 1;
            } else {
                summary.failed_requests += 1;
            }
            summary.total_tokens += u64::from(record.total_tokens);
            summary.total_cost_cents += record.cost_cents;
            total_latency += u128::from(record.latency_ms);

            for breakdown in [
                summary
                    .by_provider
                    .entry(record.provider.clone())
                    .or_default(),
                summary.by_model.entry(record.model.clone()).or_default(),
            ] {
                breakdown.requests += 1;
                breakdown.tokens += u64::from(record.total_tokens);
                breakdown.cost_cents += record.cost_cents;
            }
        }

        if summary.total_requests > 0 {
            summary.average_latency_ms = total_latency as f64 / summary.total_requests as f64;
        }
        summary
    }
}
