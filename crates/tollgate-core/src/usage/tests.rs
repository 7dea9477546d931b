//! Tests for usage module

use super::store::MockUsageStore;
use super::*;
use crate::error::Error;
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tollgate_llm::TokenUsage;

fn ok(user: &str, provider: &str, model: &str, tokens: (u32, u32), cost: f64) -> UsageRecord {
    UsageRecord::success(
        user,
        "req",
        provider,
        model,
        TokenUsage::new(tokens.0, tokens.1),
        cost,
        200,
    )
}

#[tokio::test]
async fn test_record_assigns_ids() {
    let tracker = UsageTracker::new(Arc::new(InMemoryUsageStore::new()));
    let a = tracker
        .record(ok("u1", "openai", "gpt-5", (100, 50), 0.1))
        .await;
    let b = tracker
        .record(ok("u1", "openai", "gpt-5", (100, 50), 0.1))
        .await;
    assert!(!a.is_empty());
    assert_ne!(a, b);

    let records = tracker.get_records(&UsageFilter::default()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, a);
}

#[tokio::test]
async fn test_summary_breakdowns() {
    let tracker = UsageTracker::new(Arc::new(InMemoryUsageStore::new()));
    tracker
        .record(ok("u1", "openai", "gpt-5", (1_000, 500), 0.625))
        .await;
    tracker
        .record(ok("u1", "anthropic", "claude-haiku-4-5-20251001", (200, 100), 0.07))
        .await;
    tracker
        .record(UsageRecord::failure(
            "u2",
            "req-9",
            "openai",
            "gpt-5",
            "upstream timeout",
            30_000,
        ))
        .await;

    let summary = tracker.get_summary(&UsageFilter::default()).await.unwrap();
    assert_eq!(summary.total_requests, 3);
    assert_eq!(summary.successful_requests, 2);
    assert_eq!(summary.failed_requests, 1);
    assert_eq!(summary.total_tokens, 1_800);
    assert!((summary.total_cost_cents - 0.695).abs() < 1e-9);
    assert!((summary.average_latency_ms - 10_133.333_333).abs() < 1e-3);

    let openai = &summary.by_provider["openai"];
    assert_eq!(openai.requests, 2);
    assert_eq!(openai.tokens, 1_500);
    assert_eq!(summary.by_model["claude-haiku-4-5-20251001"].requests, 1);
}

#[tokio::test]
async fn test_filters() {
    let tracker = UsageTracker::new(Arc::new(InMemoryUsageStore::new()));
    let base = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
    tracker
        .record(ok("u1", "openai", "gpt-5", (10, 10), 0.01).at(base))
        .await;
    tracker
        .record(ok("u2", "openai", "gpt-5-nano", (10, 10), 0.001).at(base + Duration::hours(1)))
        .await;
    tracker
        .record(
            ok("u1", "groq", "llama-3.3-70b-versatile", (10, 10), 0.002)
                .at(base + Duration::hours(2)),
        )
        .await;

    let by_user = tracker
        .get_records(&UsageFilter::for_user("u1"))
        .await
        .unwrap();
    assert_eq!(by_user.len(), 2);

    let by_provider = tracker
        .get_records(&UsageFilter::default().with_provider("openai"))
        .await
        .unwrap();
    assert_eq!(by_provider.len(), 2);

    let by_model = tracker
        .get_records(&UsageFilter::default().with_model("gpt-5-nano"))
        .await
        .unwrap();
    assert_eq!(by_model[0].user_id, "u2");

    let windowed = tracker
        .get_records(&UsageFilter::default().between(
            Some(base + Duration::minutes(30)),
            Some(base + Duration::hours(2)),
        ))
        .await
        .unwrap();
    assert_eq!(windowed.len(), 1);
    assert_eq!(windowed[0].model, "gpt-5-nano");
}

#[tokio::test]
async fn test_get_recent() {
    let tracker = UsageTracker::new(Arc::new(InMemoryUsageStore::new()));
    let base = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
    for i in 0..5 {
        tracker
            .record(
                ok("u1", "openai", &format!("m{i}"), (1, 1), 0.0)
                    .at(base + Duration::minutes(i)),
            )
            .await;
    }

    let recent = tracker.get_recent(2).await.unwrap();
    let models: Vec<&str> = recent.iter().map(|r| r.model.as_str()).collect();
    assert_eq!(models, vec!["m4", "m3"]);
}

#[tokio::test]
async fn test_store_caps_records() {
    let store = Arc::new(InMemoryUsageStore::with_max_records(3));
    let tracker = UsageTracker::new(store.clone());
    for i in 0..5 {
        tracker
            .record(ok("u1", "openai", &format!("m{i}"), (1, 1), 0.0))
            .await;
    }

    assert_eq!(store.len().await, 3);
    let records = tracker.get_records(&UsageFilter::default()).await.unwrap();
    assert_eq!(records[0].model, "m2");
}

#[tokio::test]
async fn test_record_never_fails() {
    let mut store = MockUsageStore::new();
    store
        .expect_insert()
        .times(1)
        .returning(|_| Err(Error::Store("disk full".to_string())));

    let tracker = UsageTracker::new(Arc::new(store));
    let id = tracker
        .record(ok("u1", "openai", "gpt-5", (1, 1), 0.0))
        .await;
    assert!(!id.is_empty());
}

#[tokio::test]
async fn test_query_error_propagates() {
    let mut store = MockUsageStore::new();
    store
        .expect_query()
        .returning(|_| Err(Error::Store("unreachable".to_string())));

    let tracker = UsageTracker::new(Arc::new(store));
    assert!(matches!(
        tracker.get_summary(&UsageFilter::default()).await,
        Err(Error::Store(_))
    ));
}
