//! State Sweeper - periodic eviction of idle per-key state
//!
//! Rate-limit entries, conversation histories and budget reservations are
//! keyed by caller-supplied ids. Each component drops its own idle entries;
//! this task calls them on a fixed interval.

use crate::budget::BudgetManager;
use crate::loop_detector::LoopDetector;
use crate::rate_limiter::RateLimiter;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sweep settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Seconds between sweeps; 0 disables the background task
    pub interval_secs: u64,
    /// Seconds an unreported budget reservation is held
    pub reservation_ttl_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            reservation_ttl_secs: crate::budget::DEFAULT_RESERVATION_TTL_SECS,
        }
    }
}

/// Entries removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Idle rate-limit users
    pub rate_limit_users: usize,
    /// Idle conversation histories
    pub conversations: usize,
    /// Lapsed or stale budget reservations
    pub reservations: usize,
}

impl CleanupReport {
    /// Total entries removed
    #[must_use]
    pub fn total(&self) -> usize {
        self.rate_limit_users + self.conversations + self.reservations
    }
}

#[derive(Debug, Clone)]
struct Targets {
    budgets: Arc<BudgetManager>,
    rate_limiter: Arc<RateLimiter>,
    loop_detector: Arc<LoopDetector>,
}

impl Targets {
    fn sweep(&self) -> CleanupReport {
        let report = CleanupReport {
            rate_limit_users: self.rate_limiter.cleanup(),
            conversations: self.loop_detector.cleanup(),
            reservations: self.budgets.purge_expired_reservations(),
        };
        if report.total() > 0 {
            debug!(
                rate_limit_users = report.rate_limit_users,
                conversations = report.conversations,
                reservations = report.reservations,
                "Swept idle state"
            );
        }
        report
    }
}

/// Owns the background sweep task
pub struct StateSweeper {
    targets: Targets,
    interval: Duration,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl std::fmt::Debug for StateSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSweeper")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl StateSweeper {
    /// Create a stopped sweeper
    #[must_use]
    pub fn new(
        budgets: Arc<BudgetManager>,
        rate_limiter: Arc<RateLimiter>,
        loop_detector: Arc<LoopDetector>,
        interval: Duration,
    ) -> Self {
        Self {
            targets: Targets {
                budgets,
                rate_limiter,
                loop_detector,
            },
            interval: interval.max(Duration::from_millis(1)),
            task: Mutex::new(None),
        }
    }

    /// Whether the background task is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Spawn the background task
    ///
    /// Returns false when it was already running. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let shutdown = token.clone();
        let targets = self.targets.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        targets.sweep();
                    }
                }
            }
        });

        *task = Some((token, handle));
        info!(interval_ms = interval.as_millis() as u64, "State sweeper started");
        true
    }

    /// Cancel the background task and wait for it to finish
    pub async fn stop(&self) -> bool {
        let running = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some((token, handle)) = running else {
            return false;
        };

        token.cancel();
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "State sweeper task ended abnormally");
            }
        }
        info!("State sweeper stopped");
        true
    }

    /// Sweep once
    pub fn run_once(&self) -> CleanupReport {
        self.targets.sweep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetOptions, BudgetPeriod, InMemoryBudgetStore};
    use crate::event_bus::EventBus;
    use tollgate_llm::Message;

    fn sweeper(interval: Duration) -> StateSweeper {
        let budgets = BudgetManager::new(Arc::new(InMemoryBudgetStore::new()), EventBus::default())
            .with_reservation_ttl(Duration::from_secs(1));
        StateSweeper::new(
            Arc::new(budgets),
            Arc::new(RateLimiter::default()),
            Arc::new(LoopDetector::default()),
            interval,
        )
    }

    #[test]
    fn test_run_once_on_fresh_state_removes_nothing() {
        let sweeper = sweeper(Duration::from_secs(60));
        sweeper.targets.rate_limiter.consume_request("u1", 10);
        sweeper
            .targets
            .loop_detector
            .add_to_history("c1", &[Message::user("hi")]);

        assert_eq!(sweeper.run_once(), CleanupReport::default());
        assert_eq!(sweeper.targets.rate_limiter.tracked_users(), 1);
        assert_eq!(sweeper.targets.loop_detector.tracked_conversations(), 1);
    }

    #[tokio::test]
    async fn test_run_once_purges_lapsed_reservations() {
        let sweeper = sweeper(Duration::from_secs(60));
        let budgets = &sweeper.targets.budgets;
        let options = BudgetOptions {
            hard_limit: true,
            ..Default::default()
        };
        let budget = budgets
            .create_budget("team", 100.0, BudgetPeriod::Monthly, options)
            .await
            .unwrap();
        budgets.reserve(&budget.id, "req-1", 0.0).unwrap().unwrap();
        assert_eq!(budgets.reservation_count(), 1);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(sweeper.run_once().reservations, 1);
        assert_eq!(budgets.reservation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_is_idempotent() {
        let sweeper = sweeper(Duration::from_secs(10));
        assert!(sweeper.start());
        assert!(!sweeper.start());
        assert!(sweeper.is_running());

        tokio::time::sleep(Duration::from_secs(25)).await;

        assert!(sweeper.stop().await);
        assert!(!sweeper.stop().await);
        assert!(!sweeper.is_running());
    }
}
