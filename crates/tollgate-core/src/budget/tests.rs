//! Tests for budget module

use super::manager::Clock;
use super::store::MockBudgetStore;
use super::*;
use crate::error::Error;
use crate::event_bus::{EventBus, GatewayEvent};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
    fn at(y: i32, m: u32, d: u32) -> Self {
        Self(Arc::new(Mutex::new(
            Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap(),
        )))
    }

    fn clock(&self) -> Clock {
        let now = Arc::clone(&self.0);
        Arc::new(move || *now.lock().unwrap())
    }

    fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

fn manager() -> BudgetManager {
    BudgetManager::new(Arc::new(InMemoryBudgetStore::new()), EventBus::default())
}

fn hard() -> BudgetOptions {
    BudgetOptions {
        hard_limit: true,
        ..Default::default()
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<GatewayEvent>) -> Vec<GatewayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_create_budget() {
    let mgr = manager();
    let budget = mgr
        .create_budget("team", 1_000.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();

    assert_eq!(budget.spent_cents, 0.0);
    assert!(budget.signaled_thresholds.is_empty());
    assert_eq!(budget.alert_thresholds, vec![50.0, 80.0, 100.0]);

    let status = mgr.get_status(&budget.id).unwrap();
    assert_eq!(status.remaining_cents, 1_000.0);
    assert_eq!(status.percent_used, 0.0);
    assert_eq!(mgr.list_budgets().len(), 1);
}

#[tokio::test]
async fn test_create_rejects_invalid_limit() {
    let mgr = manager();
    let err = mgr
        .create_budget("team", 0.0, BudgetPeriod::Daily, BudgetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidBudget(_)));

    let err = mgr
        .create_budget(" ", 10.0, BudgetPeriod::Daily, BudgetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidBudget(_)));
}

#[tokio::test]
async fn test_spending_is_associative() {
    let mgr = manager();
    let a = mgr
        .create_budget("a", 1_000.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();
    let b = mgr
        .create_budget("b", 1_000.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();

    mgr.record_spending(&a.id, 30.0).await.unwrap();
    mgr.record_spending(&a.id, 70.0).await.unwrap();
    mgr.record_spending(&b.id, 100.0).await.unwrap();

    assert_eq!(
        mgr.get_status(&a.id).unwrap().spent_cents,
        mgr.get_status(&b.id).unwrap().spent_cents
    );
}

#[tokio::test]
async fn test_hard_limit_blocks() {
    let mgr = manager();
    let budget = mgr
        .create_budget("capped", 1_000.0, BudgetPeriod::Monthly, hard())
        .await
        .unwrap();
    mgr.record_spending(&budget.id, 900.0).await.unwrap();

    assert!(!mgr.can_spend(&budget.id, 200.0).unwrap());
    assert!(mgr.can_spend(&budget.id, 50.0).unwrap());
    assert!(mgr.can_spend(&budget.id, 100.0).unwrap());
}

#[tokio::test]
async fn test_soft_limit_always_allows() {
    let mgr = manager();
    let budget = mgr
        .create_budget("soft", 100.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();
    mgr.record_spending(&budget.id, 150.0).await.unwrap();

    assert!(mgr.can_spend(&budget.id, 1_000_000.0).unwrap());
    let status = mgr.get_status(&budget.id).unwrap();
    assert_eq!(status.remaining_cents, 0.0);
    assert!((status.percent_used - 150.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_hard_limit_percent_is_clamped() {
    let mgr = manager();
    let budget = mgr
        .create_budget("capped", 100.0, BudgetPeriod::Monthly, hard())
        .await
        .unwrap();
    mgr.record_spending(&budget.id, 150.0).await.unwrap();

    let status = mgr.get_status(&budget.id).unwrap();
    assert_eq!(status.percent_used, 100.0);
    assert_eq!(status.remaining_cents, 0.0);
}

#[tokio::test]
async fn test_thresholds_fire_once_per_period() {
    let events = EventBus::new(32);
    let mut rx = events.subscribe();
    let mgr = BudgetManager::new(Arc::new(InMemoryBudgetStore::new()), events);
    let budget = mgr
        .create_budget(
            "alerts",
            100.0,
            BudgetPeriod::Monthly,
            BudgetOptions {
                alert_thresholds: vec![80.0, 50.0],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    mgr.record_spending(&budget.id, 60.0).await.unwrap();
    let fired = drain(&mut rx);
    assert_eq!(fired.len(), 1);
    assert!(matches!(
        fired[0],
        GatewayEvent::BudgetWarning { threshold, .. } if threshold == 50.0
    ));

    mgr.record_spending(&budget.id, 10.0).await.unwrap();
    assert!(drain(&mut rx).is_empty());

    mgr.record_spending(&budget.id, 20.0).await.unwrap();
    let fired = drain(&mut rx);
    assert_eq!(fired.len(), 1);
    assert!(matches!(
        fired[0],
        GatewayEvent::BudgetWarning { threshold, .. } if threshold == 80.0
    ));
}

#[tokio::test]
async fn test_exceeded_fires_once() {
    let events = EventBus::new(32);
    let mut rx = events.subscribe();
    let mgr = BudgetManager::new(Arc::new(InMemoryBudgetStore::new()), events);
    let budget = mgr
        .create_budget(
            "tight",
            50.0,
            BudgetPeriod::Daily,
            BudgetOptions {
                alert_thresholds: Vec::new(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    mgr.record_spending(&budget.id, 60.0).await.unwrap();
    mgr.record_spending(&budget.id, 5.0).await.unwrap();

    let exceeded: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, GatewayEvent::BudgetExceeded { .. }))
        .collect();
    assert_eq!(exceeded.len(), 1);
}

#[tokio::test]
async fn test_period_rollover_resets_spend() {
    let clock = TestClock::at(2026, 3, 10);
    let mgr = manager().with_clock(clock.clock());
    let budget = mgr
        .create_budget("daily", 1_000.0, BudgetPeriod::Daily, BudgetOptions::default())
        .await
        .unwrap();
    mgr.record_spending(&budget.id, 600.0).await.unwrap();
    assert_eq!(mgr.get_budget(&budget.id).unwrap().signaled_thresholds, vec![50.0]);

    clock.advance(Duration::hours(6));
    assert_eq!(mgr.get_status(&budget.id).unwrap().spent_cents, 600.0);

    clock.advance(Duration::hours(7));
    let rolled = mgr.get_budget(&budget.id).unwrap();
    assert_eq!(rolled.spent_cents, 0.0);
    assert!(rolled.signaled_thresholds.is_empty());
    assert_eq!(rolled.carried_over_cents, 0.0);
    assert_eq!(
        rolled.period_start,
        Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_rollover_carries_unspent_balance() {
    let clock = TestClock::at(2026, 1, 20);
    let mgr = manager().with_clock(clock.clock());
    let budget = mgr
        .create_budget(
            "carry",
            1_000.0,
            BudgetPeriod::Monthly,
            BudgetOptions {
                rollover: true,
                ..hard()
            },
        )
        .await
        .unwrap();
    mgr.record_spending(&budget.id, 300.0).await.unwrap();

    clock.advance(Duration::days(15));
    let status = mgr.get_status(&budget.id).unwrap();
    assert_eq!(status.spent_cents, 0.0);
    assert_eq!(status.limit_cents, 1_700.0);
    assert!(mgr.can_spend(&budget.id, 1_600.0).unwrap());

    // The carried balance lasts one period only
    mgr.record_spending(&budget.id, 1_700.0).await.unwrap();
    clock.advance(Duration::days(31));
    let status = mgr.get_status(&budget.id).unwrap();
    assert_eq!(status.limit_cents, 1_000.0);
}

#[tokio::test]
async fn test_rollover_after_idle_periods() {
    let clock = TestClock::at(2026, 1, 20);
    let mgr = manager().with_clock(clock.clock());
    let budget = mgr
        .create_budget(
            "idle",
            1_000.0,
            BudgetPeriod::Monthly,
            BudgetOptions {
                rollover: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    mgr.record_spending(&budget.id, 900.0).await.unwrap();

    clock.advance(Duration::days(70));
    let status = mgr.get_status(&budget.id).unwrap();
    assert_eq!(status.limit_cents, 2_000.0);
}

#[tokio::test]
async fn test_reserve_settle_release() {
    let mgr = manager();
    let budget = mgr
        .create_budget("capped", 1_000.0, BudgetPeriod::Monthly, hard())
        .await
        .unwrap();

    let held = mgr.reserve(&budget.id, "req-1", 600.0).unwrap().unwrap();
    assert_eq!(held.amount_cents, 600.0);
    assert_eq!(mgr.get_status(&budget.id).unwrap().reserved_cents, 600.0);

    // The hold counts toward the hard limit
    assert!(mgr.reserve(&budget.id, "req-2", 500.0).unwrap().is_none());
    assert!(!mgr.can_spend(&budget.id, 500.0).unwrap());

    let status = mgr.settle("req-1", 550.0).await.unwrap();
    assert_eq!(status.spent_cents, 550.0);
    assert_eq!(status.reserved_cents, 0.0);
    assert!(mgr.get_reservation("req-1").is_none());

    assert!(mgr.reserve(&budget.id, "req-3", 400.0).unwrap().is_some());
    assert!(mgr.release("req-3"));
    assert!(!mgr.release("req-3"));
    assert_eq!(mgr.get_status(&budget.id).unwrap().reserved_cents, 0.0);

    let err = mgr.settle("req-3", 1.0).await.unwrap_err();
    assert!(matches!(err, Error::ReservationNotFound(_)));
}

#[tokio::test]
async fn test_rollover_clears_holds() {
    let clock = TestClock::at(2026, 5, 1);
    let mgr = manager().with_clock(clock.clock());
    let budget = mgr
        .create_budget("capped", 1_000.0, BudgetPeriod::Daily, hard())
        .await
        .unwrap();
    mgr.reserve(&budget.id, "req-1", 400.0).unwrap().unwrap();

    clock.advance(Duration::days(1));
    mgr.reserve(&budget.id, "req-2", 100.0).unwrap().unwrap();
    assert_eq!(mgr.get_status(&budget.id).unwrap().reserved_cents, 100.0);

    // The stale hold was purged by the rollover
    assert!(mgr.get_reservation("req-1").is_none());
    assert!(!mgr.release("req-1"));
    assert_eq!(mgr.reservation_count(), 1);
    assert_eq!(mgr.get_status(&budget.id).unwrap().reserved_cents, 100.0);
}

#[tokio::test]
async fn test_unreported_holds_lapse() {
    let clock = TestClock::at(2026, 5, 1);
    let mgr = manager()
        .with_clock(clock.clock())
        .with_reservation_ttl(std::time::Duration::from_secs(600));
    let budget = mgr
        .create_budget("capped", 1_000.0, BudgetPeriod::Monthly, hard())
        .await
        .unwrap();

    mgr.reserve(&budget.id, "req-1", 600.0).unwrap().unwrap();
    clock.advance(Duration::minutes(5));
    mgr.reserve(&budget.id, "req-2", 300.0).unwrap().unwrap();
    assert!(mgr.reserve(&budget.id, "req-3", 200.0).unwrap().is_none());

    // req-1 lapses; req-2 is still inside its lifetime
    clock.advance(Duration::minutes(6));
    assert!(mgr.get_reservation("req-1").is_none());
    assert!(mgr.get_reservation("req-2").is_some());
    let held = mgr.reserve(&budget.id, "req-3", 200.0).unwrap().unwrap();
    assert_eq!(
        held.expires_at,
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 21, 0).unwrap()
    );
    assert_eq!(mgr.get_status(&budget.id).unwrap().reserved_cents, 500.0);
    assert_eq!(mgr.reservation_count(), 2);

    // A lapsed hold can no longer be settled
    assert!(matches!(
        mgr.settle("req-1", 10.0).await,
        Err(Error::ReservationNotFound(_))
    ));

    clock.advance(Duration::minutes(20));
    assert_eq!(mgr.purge_expired_reservations(), 2);
    let status = mgr.get_status(&budget.id).unwrap();
    assert_eq!(status.reserved_cents, 0.0);
    assert_eq!(status.spent_cents, 0.0);
}

#[tokio::test]
async fn test_purge_drops_zero_amount_and_stale_holds() {
    let clock = TestClock::at(2026, 5, 1);
    let mgr = manager().with_clock(clock.clock());
    let daily = mgr
        .create_budget("daily", 1_000.0, BudgetPeriod::Daily, hard())
        .await
        .unwrap();
    mgr.reserve(&daily.id, "free-call", 0.0).unwrap().unwrap();
    mgr.reserve(&daily.id, "paid-call", 50.0).unwrap().unwrap();

    clock.advance(Duration::days(2));
    assert_eq!(mgr.purge_expired_reservations(), 2);
    assert_eq!(mgr.reservation_count(), 0);
}

#[tokio::test]
async fn test_concurrent_spending_loses_nothing() {
    let mgr = Arc::new(manager());
    let budget = mgr
        .create_budget("busy", 100_000.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let mgr = Arc::clone(&mgr);
            let id = budget.id.clone();
            tokio::spawn(async move { mgr.record_spending(&id, 10.0).await.unwrap() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(mgr.get_status(&budget.id).unwrap().spent_cents, 1_000.0);
}

#[tokio::test]
async fn test_concurrent_spending_persists_latest() {
    let store = Arc::new(InMemoryBudgetStore::new());
    let mgr = Arc::new(BudgetManager::new(store.clone(), EventBus::default()));
    let budget = mgr
        .create_budget("busy", 100_000.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let mgr = Arc::clone(&mgr);
            let id = budget.id.clone();
            tokio::spawn(async move { mgr.record_spending(&id, 10.0).await.unwrap() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let stored = store.get(&budget.id).await.unwrap().unwrap();
    assert_eq!(stored.spent_cents, 500.0);
    assert_eq!(stored.version, 50);
}

#[tokio::test]
async fn test_store_ignores_older_snapshot() {
    let store = InMemoryBudgetStore::new();
    let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
    let mut newer = Budget::new(
        "b1".to_string(),
        "team".to_string(),
        100.0,
        BudgetPeriod::Monthly,
        BudgetOptions::default(),
        now,
    );
    let mut older = newer.clone();
    older.spent_cents = 30.0;
    older.version = 1;
    newer.spent_cents = 100.0;
    newer.version = 2;

    store.create(&newer).await.unwrap();
    store.update(&older).await.unwrap();
    assert_eq!(store.get("b1").await.unwrap().unwrap().spent_cents, 100.0);

    newer.spent_cents = 120.0;
    newer.version = 3;
    store.update(&newer).await.unwrap();
    assert_eq!(store.get("b1").await.unwrap().unwrap().spent_cents, 120.0);
}

#[tokio::test]
async fn test_store_failure_does_not_fail_spending() {
    let mut store = MockBudgetStore::new();
    store.expect_create().returning(|_| Ok(()));
    store
        .expect_update()
        .returning(|_| Err(Error::Store("connection reset".to_string())));

    let mgr = BudgetManager::new(Arc::new(store), EventBus::default());
    let budget = mgr
        .create_budget("team", 100.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();

    let status = mgr.record_spending(&budget.id, 25.0).await.unwrap();
    assert_eq!(status.spent_cents, 25.0);
}

#[tokio::test]
async fn test_unknown_budget() {
    let mgr = manager();
    assert!(matches!(
        mgr.can_spend("missing", 1.0),
        Err(Error::BudgetNotFound(_))
    ));
    assert!(matches!(
        mgr.record_spending("missing", 1.0).await,
        Err(Error::BudgetNotFound(_))
    ));
    assert!(matches!(
        mgr.reserve("missing", "req", 1.0),
        Err(Error::BudgetNotFound(_))
    ));
}

#[tokio::test]
async fn test_negative_spend_rejected() {
    let mgr = manager();
    let budget = mgr
        .create_budget("team", 100.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();
    assert!(matches!(
        mgr.record_spending(&budget.id, -5.0).await,
        Err(Error::InvalidBudget(_))
    ));
    assert_eq!(mgr.get_status(&budget.id).unwrap().spent_cents, 0.0);
}

#[tokio::test]
async fn test_update_and_delete() {
    let store = Arc::new(InMemoryBudgetStore::new());
    let mgr = BudgetManager::new(store.clone(), EventBus::default());
    let budget = mgr
        .create_budget("team", 100.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();
    mgr.record_spending(&budget.id, 60.0).await.unwrap();

    let updated = mgr
        .update_budget(
            &budget.id,
            BudgetUpdate {
                limit_cents: Some(200.0),
                hard_limit: Some(true),
                alert_thresholds: Some(vec![25.0, 90.0]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.limit_cents, 200.0);
    assert!(updated.hard_limit);
    assert!(updated.signaled_thresholds.is_empty());
    assert_eq!(
        store.get(&budget.id).await.unwrap().unwrap().limit_cents,
        200.0
    );

    assert!(mgr.delete_budget(&budget.id).await.unwrap());
    assert!(mgr.get_budget(&budget.id).is_none());
    assert!(store.get(&budget.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_load_from_store() {
    let store = Arc::new(InMemoryBudgetStore::new());
    let first = BudgetManager::new(store.clone(), EventBus::default());
    let budget = first
        .create_budget("team", 100.0, BudgetPeriod::Monthly, BudgetOptions::default())
        .await
        .unwrap();
    first.record_spending(&budget.id, 40.0).await.unwrap();

    let second = BudgetManager::new(store, EventBus::default());
    assert_eq!(second.load_from_store().await.unwrap(), 1);
    assert_eq!(second.get_status(&budget.id).unwrap().spent_cents, 40.0);
}

#[test]
fn test_period_boundaries() {
    let at = Utc.with_ymd_and_hms(2026, 12, 15, 8, 30, 0).unwrap();
    assert_eq!(
        BudgetPeriod::Monthly.next_start(BudgetPeriod::Monthly.start_of(at)),
        Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(
        BudgetPeriod::Daily.start_of(at),
        Utc.with_ymd_and_hms(2026, 12, 15, 0, 0, 0).unwrap()
    );
    assert_eq!(
        BudgetPeriod::Monthly.periods_between(at, at + Duration::days(50)),
        2
    );
}
