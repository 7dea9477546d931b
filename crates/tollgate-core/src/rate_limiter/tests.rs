use super::*;
use crate::error::ErrorCode;
use std::sync::Arc;

fn limiter() -> RateLimiter {
    RateLimiter::default()
}

#[test]
fn test_default_tier_is_standard() {
    let limiter = limiter();
    assert_eq!(limiter.get_tier("new-user"), "standard");

    let status = limiter.check_request("new-user");
    assert!(!status.is_limited);
    assert_eq!(status.remaining_requests, 60);
    assert_eq!(status.max_concurrent, 5);
    assert!(status.retry_after_ms.is_none());

    // Checking never creates state
    assert!(limiter.status("new-user").is_none());
}

#[test]
fn test_unknown_tier_rejected() {
    let limiter = limiter();
    assert!(matches!(
        limiter.set_tier("u1", "platinum"),
        Err(Error::Configuration(_))
    ));
    assert_eq!(limiter.get_tier("u1"), "standard");
}

#[test]
fn test_free_tier_limited_after_ten_requests() {
    let limiter = limiter();
    limiter.set_tier("u1", "free").unwrap();

    for _ in 0..10 {
        limiter.consume_request("u1", 0);
        // Free tier allows one in flight; finish each before the next
        limiter.release_request("u1");
    }

    let status = limiter.check_request("u1");
    assert!(status.is_limited);
    assert_eq!(status.remaining_requests, 0);
    assert!(status.retry_after_ms.unwrap() > 0);

    limiter.reset_limits("u1");
    assert!(!limiter.check_request("u1").is_limited);
}

#[test]
fn test_token_limit() {
    let limiter = limiter();
    limiter.set_tier("u1", "free").unwrap();

    limiter.consume_request("u1", 9_000);
    limiter.release_request("u1");
    let status = limiter.check_request("u1");
    assert!(!status.is_limited);
    assert_eq!(status.remaining_tokens, 1_000);

    limiter.consume_request("u1", 1_000);
    limiter.release_request("u1");
    assert!(limiter.check_request("u1").is_limited);
}

#[test]
fn test_concurrency_limit() {
    let limiter = limiter();
    limiter.set_tier("u1", "free").unwrap();

    limiter.consume_request("u1", 10);
    let status = limiter.check_request("u1");
    assert!(status.is_limited);
    assert_eq!(status.concurrent, 1);

    // Release frees concurrency but the request stays counted
    limiter.release_request("u1");
    let status = limiter.check_request("u1");
    assert!(!status.is_limited);
    assert_eq!(status.remaining_requests, 9);
}

#[test]
fn test_window_resets_lazily() {
    let limiter = limiter();
    limiter.set_tier("u1", "free").unwrap();
    let start = Instant::now();

    for _ in 0..10 {
        limiter.consume_request_at("u1", 100, start);
        limiter.release_request("u1");
    }
    assert!(limiter.check_request_at("u1", start).is_limited);

    let later = start + WINDOW + Duration::from_secs(1);
    let status = limiter.check_request_at("u1", later);
    assert!(!status.is_limited);
    assert_eq!(status.remaining_requests, 10);

    // Consuming in the new window restarts counting
    let status = limiter.consume_request_at("u1", 100, later);
    assert_eq!(status.remaining_requests, 9);
    assert_eq!(status.remaining_tokens, 9_900);
}

#[test]
fn test_release_never_underflows() {
    let limiter = limiter();
    limiter.release_request("ghost");
    limiter.consume_request("u1", 0);
    limiter.release_request("u1");
    limiter.release_request("u1");
    assert_eq!(limiter.status("u1").unwrap().concurrent, 0);
}

#[test]
fn test_check_reports_error() {
    let limiter = limiter();
    limiter.set_tier("u1", "free").unwrap();

    let check = limiter.check("u1");
    assert!(check.allowed);
    assert!(check.error.is_none());

    limiter.consume_request("u1", 0);
    let check = limiter.check("u1");
    assert!(!check.allowed);
    let error = check.error.unwrap();
    assert_eq!(error.code, ErrorCode::RateLimited);
    assert!(error.retry_after_ms.unwrap() > 0);

    // Checking did not consume
    assert_eq!(limiter.status("u1").unwrap().requests, 1);
}

#[test]
fn test_acquire_slot_releases_on_drop() {
    let limiter = limiter();
    limiter.set_tier("u1", "free").unwrap();

    {
        let slot = limiter.acquire("u1", 50).unwrap();
        assert_eq!(slot.user_id(), "u1");
        assert!(matches!(
            limiter.acquire("u1", 50),
            Err(Error::RateLimited { .. })
        ));
    }

    assert_eq!(limiter.status("u1").unwrap().concurrent, 0);
    assert!(limiter.acquire("u1", 50).is_ok());
}

#[tokio::test]
async fn test_execute_runs_and_releases() {
    let limiter = limiter();
    let value = limiter
        .execute("u1", 10, || async { 21 * 2 })
        .await
        .unwrap();
    assert_eq!(value, 42);

    let usage = limiter.status("u1").unwrap();
    assert_eq!(usage.requests, 1);
    assert_eq!(usage.tokens, 10);
    assert_eq!(usage.concurrent, 0);
}

#[tokio::test]
async fn test_execute_releases_on_error() {
    let limiter = limiter();
    let result: Result<std::result::Result<(), String>> = limiter
        .execute("u1", 0, || async { Err("provider exploded".to_string()) })
        .await;
    assert!(result.unwrap().is_err());
    assert_eq!(limiter.status("u1").unwrap().concurrent, 0);
}

#[tokio::test]
async fn test_execute_rejects_without_invoking() {
    let limiter = limiter();
    limiter.set_tier("u1", "free").unwrap();
    let _held = limiter.acquire("u1", 0).unwrap();

    let mut invoked = false;
    let result = limiter
        .execute("u1", 0, || {
            invoked = true;
            async {}
        })
        .await;
    assert!(matches!(result, Err(Error::RateLimited { .. })));
    assert!(!invoked);
}

#[tokio::test]
async fn test_execute_releases_on_cancel() {
    let limiter = Arc::new(limiter());
    limiter.set_tier("u1", "free").unwrap();

    let task = {
        let limiter = Arc::clone(&limiter);
        tokio::spawn(async move {
            limiter
                .execute("u1", 0, || tokio::time::sleep(Duration::from_secs(3_600)))
                .await
        })
    };
    tokio::task::yield_now().await;
    while limiter.status("u1").map(|u| u.concurrent) != Some(1) {
        tokio::task::yield_now().await;
    }

    task.abort();
    let _ = task.await;
    assert_eq!(limiter.status("u1").unwrap().concurrent, 0);
}

#[test]
fn test_users_are_independent() {
    let limiter = limiter();
    limiter.set_tier("a", "free").unwrap();
    limiter.consume_request("a", 0);

    assert!(limiter.check_request("a").is_limited);
    assert!(!limiter.check_request("b").is_limited);
}

#[test]
fn test_tier_limits_lookup() {
    let limiter = limiter();
    assert_eq!(
        limiter.tier_limits("premium"),
        Some(TierLimits::new(300, 1_000_000, 20))
    );
    assert!(limiter.tier_limits("platinum").is_none());
}

#[test]
fn test_cleanup_drops_idle_users() {
    let limiter = limiter();
    let start = Instant::now();
    for i in 0..100 {
        let user = format!("user-{i}");
        limiter.consume_request_at(&user, 10, start);
        limiter.release_request(&user);
    }
    limiter.set_tier("vip", "premium").unwrap();
    limiter.consume_request_at("busy", 10, start);
    assert_eq!(limiter.tracked_users(), 102);

    // Nothing is idle inside the window
    assert_eq!(limiter.cleanup_at(start), 0);

    let later = start + Duration::from_secs(3_600);
    assert_eq!(limiter.cleanup_at(later), 100);
    assert_eq!(limiter.tracked_users(), 2);
    assert_eq!(limiter.get_tier("vip"), "premium");
    assert_eq!(limiter.status("busy").unwrap().concurrent, 1);

    // A cleaned-up user starts fresh
    let status = limiter.check_request_at("user-0", later);
    assert_eq!(status.remaining_requests, 60);
}
