//! Budget manager implementation

use super::store::BudgetStore;
use super::types::{
    normalize_thresholds, Budget, BudgetOptions, BudgetPeriod, BudgetStatus, BudgetUpdate,
    Reservation,
};
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, GatewayEvent};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Source of the current time
pub(crate) type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// How long a hold lives without a settle or release
pub const DEFAULT_RESERVATION_TTL_SECS: u64 = 600;

/// Tracks spend against named budgets
///
/// Each budget is mutated under its own map entry lock, so concurrent
/// spending on one budget never loses an update and unrelated budgets never
/// contend. Period rollover and lapsed reservations are applied lazily on
/// every access.
pub struct BudgetManager {
    budgets: DashMap<String, Budget>,
    reservations: DashMap<String, Reservation>,
    store: Arc<dyn BudgetStore>,
    events: EventBus,
    reservation_ttl: Duration,
    clock: Clock,
}

impl fmt::Debug for BudgetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BudgetManager")
            .field("budgets", &self.budgets.len())
            .field("reservations", &self.reservations.len())
            .finish()
    }
}

impl BudgetManager {
    /// Create a manager over a store
    #[must_use]
    pub fn new(store: Arc<dyn BudgetStore>, events: EventBus) -> Self {
        Self {
            budgets: DashMap::new(),
            reservations: DashMap::new(),
            store,
            events,
            reservation_ttl: ttl_from_secs(DEFAULT_RESERVATION_TTL_SECS),
            clock: Arc::new(Utc::now),
        }
    }

    /// Set how long an unreported hold keeps its amount
    #[must_use]
    pub fn with_reservation_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.reservation_ttl = ttl_from_secs(ttl.as_secs().max(1));
        self
    }

    /// Replace the time source
    #[must_use]
    pub(crate) fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Roll the period and drop this budget's stale or lapsed holds
    ///
    /// Runs under the budget's entry lock; returns how many holds went.
    fn refresh(&self, budget: &mut Budget, now: DateTime<Utc>) -> usize {
        let rolled = budget.roll_forward(now);
        if !rolled && budget.reserved_cents <= 0.0 {
            return 0;
        }

        let mut dropped = 0;
        let mut kept = 0;
        self.reservations.retain(|_, hold| {
            if hold.budget_id != budget.id {
                return true;
            }
            if hold.period_start != budget.period_start {
                dropped += 1;
                return false;
            }
            if hold.expires_at <= now {
                release_hold(budget, hold);
                dropped += 1;
                return false;
            }
            kept += 1;
            true
        });
        if kept == 0 {
            // No float residue once the last hold is gone
            budget.reserved_cents = 0.0;
        }
        if dropped > 0 {
            debug!(budget_id = %budget.id, dropped, "Dropped stale reservations");
        }
        dropped
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a budget with zero spend
    #[instrument(skip(self, options))]
    pub async fn create_budget(
        &self,
        name: &str,
        limit_cents: f64,
        period: BudgetPeriod,
        options: BudgetOptions,
    ) -> Result<Budget> {
        if name.trim().is_empty() {
            return Err(Error::InvalidBudget("name must not be empty".to_string()));
        }
        validate_limit(limit_cents)?;

        let budget = Budget::new(
            Uuid::new_v4().to_string(),
            name.to_string(),
            limit_cents,
            period,
            options,
            self.now(),
        );
        self.store.create(&budget).await?;
        self.budgets.insert(budget.id.clone(), budget.clone());

        info!(budget_id = %budget.id, limit_cents, "Created budget");
        Ok(budget)
    }

    /// Load every budget from the store into memory
    pub async fn load_from_store(&self) -> Result<usize> {
        let budgets = self.store.list().await?;
        let count = budgets.len();
        for budget in budgets {
            self.budgets.insert(budget.id.clone(), budget);
        }
        debug!(count, "Loaded budgets from store");
        Ok(count)
    }

    /// Apply a partial update
    pub async fn update_budget(&self, id: &str, update: BudgetUpdate) -> Result<Budget> {
        if let Some(limit) = update.limit_cents {
            validate_limit(limit)?;
        }

        let snapshot = {
            let mut budget = self
                .budgets
                .get_mut(id)
                .ok_or_else(|| Error::BudgetNotFound(id.to_string()))?;
            let now = self.now();
            self.refresh(&mut budget, now);

            if let Some(name) = update.name {
                budget.name = name;
            }
            if let Some(limit) = update.limit_cents {
                budget.limit_cents = limit;
            }
            if let Some(thresholds) = update.alert_thresholds {
                let thresholds = normalize_thresholds(thresholds);
                budget
                    .signaled_thresholds
                    .retain(|t| thresholds.contains(t));
                budget.alert_thresholds = thresholds;
            }
            if let Some(hard_limit) = update.hard_limit {
                budget.hard_limit = hard_limit;
            }
            if let Some(rollover) = update.rollover {
                budget.rollover = rollover;
            }
            budget.updated_at = now;
            budget.version += 1;
            budget.clone()
        };

        self.store.update(&snapshot).await?;
        debug!(budget_id = %id, "Updated budget");
        Ok(snapshot)
    }

    /// Remove a budget and its open reservations
    pub async fn delete_budget(&self, id: &str) -> Result<bool> {
        let existed = self.budgets.remove(id).is_some();
        self.reservations.retain(|_, r| r.budget_id != id);
        let stored = self.store.delete(id).await?;
        if existed || stored {
            info!(budget_id = %id, "Deleted budget");
        }
        Ok(existed || stored)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a budget, applying any due rollover
    #[must_use]
    pub fn get_budget(&self, id: &str) -> Option<Budget> {
        let mut budget = self.budgets.get_mut(id)?;
        self.refresh(&mut budget, self.now());
        Some(budget.clone())
    }

    /// All budgets, ordered by id
    #[must_use]
    pub fn list_budgets(&self) -> Vec<Budget> {
        let now = self.now();
        let ids: Vec<String> = self.budgets.iter().map(|b| b.key().clone()).collect();
        let mut budgets: Vec<Budget> = ids
            .iter()
            .filter_map(|id| {
                let mut budget = self.budgets.get_mut(id)?;
                self.refresh(&mut budget, now);
                Some(budget.clone())
            })
            .collect();
        budgets.sort_by(|a, b| a.id.cmp(&b.id));
        budgets
    }

    /// Whether `amount_cents` more may be spent
    ///
    /// Soft budgets always allow; hard budgets count open reservations.
    pub fn can_spend(&self, id: &str, amount_cents: f64) -> Result<bool> {
        let mut budget = self
            .budgets
            .get_mut(id)
            .ok_or_else(|| Error::BudgetNotFound(id.to_string()))?;
        self.refresh(&mut budget, self.now());
        Ok(budget.can_spend(amount_cents.max(0.0)))
    }

    /// Current spend status
    pub fn get_status(&self, id: &str) -> Result<BudgetStatus> {
        let mut budget = self
            .budgets
            .get_mut(id)
            .ok_or_else(|| Error::BudgetNotFound(id.to_string()))?;
        self.refresh(&mut budget, self.now());
        Ok(budget.status())
    }

    /// Open reservation for a request; lapsed holds are not returned
    #[must_use]
    pub fn get_reservation(&self, request_id: &str) -> Option<Reservation> {
        let now = self.now();
        self.reservations
            .get(request_id)
            .filter(|r| r.expires_at > now)
            .map(|r| r.clone())
    }

    /// Holds currently tracked, lapsed or not
    #[must_use]
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Drop lapsed and previous-period holds across every budget,
    /// returning how many were removed
    pub fn purge_expired_reservations(&self) -> usize {
        let now = self.now();
        let ids: Vec<String> = self.budgets.iter().map(|b| b.key().clone()).collect();
        let mut dropped = 0;
        for id in ids {
            if let Some(mut budget) = self.budgets.get_mut(&id) {
                dropped += self.refresh(&mut budget, now);
            }
        }

        // Lapsed holds on budgets with nothing reserved, and orphans. Keys are
        // collected first: never take a budget lock under a reservation lock.
        let leftovers: Vec<(String, String)> = self
            .reservations
            .iter()
            .map(|r| (r.key().clone(), r.budget_id.clone()))
            .collect();
        for (request_id, budget_id) in leftovers {
            let orphaned = !self.budgets.contains_key(&budget_id);
            if self
                .reservations
                .remove_if(&request_id, |_, hold| orphaned || hold.expires_at <= now)
                .is_some()
            {
                dropped += 1;
            }
        }
        dropped
    }

    // ========================================================================
    // Spending
    // ========================================================================

    /// Add spend to a budget
    ///
    /// Crossing an alert threshold publishes one warning per threshold per
    /// period; reaching the limit publishes one exceeded event per period.
    #[instrument(skip(self))]
    pub async fn record_spending(&self, id: &str, cost_cents: f64) -> Result<BudgetStatus> {
        let (snapshot, events) = self.apply_spending(id, cost_cents, None)?;
        Ok(self.finish(snapshot, events).await)
    }

    /// Atomically check `can_spend` and hold the amount for a request
    ///
    /// Returns `None` when a hard limit would be exceeded. A second
    /// reservation under the same request id replaces the first. The hold
    /// lapses after the reservation TTL unless settled or released.
    pub fn reserve(
        &self,
        id: &str,
        request_id: &str,
        amount_cents: f64,
    ) -> Result<Option<Reservation>> {
        if !self.budgets.contains_key(id) {
            return Err(Error::BudgetNotFound(id.to_string()));
        }
        self.release(request_id);

        let amount_cents = amount_cents.max(0.0);
        let mut budget = self
            .budgets
            .get_mut(id)
            .ok_or_else(|| Error::BudgetNotFound(id.to_string()))?;
        let now = self.now();
        self.refresh(&mut budget, now);

        if !budget.can_spend(amount_cents) {
            debug!(
                budget_id = %id,
                amount_cents,
                remaining_cents = budget.remaining_cents(),
                "Reservation denied by hard limit"
            );
            return Ok(None);
        }

        budget.reserved_cents += amount_cents;
        let reservation = Reservation {
            request_id: request_id.to_string(),
            budget_id: id.to_string(),
            amount_cents,
            period_start: budget.period_start,
            expires_at: now + self.reservation_ttl,
        };
        self.reservations
            .insert(request_id.to_string(), reservation.clone());
        debug!(budget_id = %id, request_id, amount_cents, "Reserved budget");
        Ok(Some(reservation))
    }

    /// Drop a reservation without spending, returning whether one existed
    pub fn release(&self, request_id: &str) -> bool {
        let Some((_, reservation)) = self.reservations.remove(request_id) else {
            return false;
        };
        if let Some(mut budget) = self.budgets.get_mut(&reservation.budget_id) {
            self.refresh(&mut budget, self.now());
            release_hold(&mut budget, &reservation);
        }
        debug!(request_id, budget_id = %reservation.budget_id, "Released reservation");
        true
    }

    /// Release a reservation and record the actual spend
    ///
    /// A hold that lapsed and was already dropped is not found.
    #[instrument(skip(self))]
    pub async fn settle(&self, request_id: &str, actual_cents: f64) -> Result<BudgetStatus> {
        let (_, reservation) = self
            .reservations
            .remove(request_id)
            .ok_or_else(|| Error::ReservationNotFound(request_id.to_string()))?;
        let (snapshot, events) =
            self.apply_spending(&reservation.budget_id, actual_cents, Some(&reservation))?;
        Ok(self.finish(snapshot, events).await)
    }

    fn apply_spending(
        &self,
        id: &str,
        cost_cents: f64,
        hold: Option<&Reservation>,
    ) -> Result<(Budget, Vec<GatewayEvent>)> {
        if !cost_cents.is_finite() || cost_cents < 0.0 {
            return Err(Error::InvalidBudget(format!(
                "spend must be a non-negative amount, got {cost_cents}"
            )));
        }

        let mut budget = self
            .budgets
            .get_mut(id)
            .ok_or_else(|| Error::BudgetNotFound(id.to_string()))?;
        let now = self.now();
        self.refresh(&mut budget, now);
        if let Some(reservation) = hold {
            release_hold(&mut budget, reservation);
        }

        budget.spent_cents += cost_cents;
        budget.updated_at = now;
        budget.version += 1;
        let events = signal_thresholds(&mut budget);
        debug!(
            budget_id = %id,
            cost_cents,
            spent_cents = budget.spent_cents,
            "Recorded spending"
        );
        Ok((budget.clone(), events))
    }

    async fn finish(&self, snapshot: Budget, events: Vec<GatewayEvent>) -> BudgetStatus {
        for event in events {
            self.events.publish(event);
        }
        if let Err(e) = self.store.update(&snapshot).await {
            warn!(budget_id = %snapshot.id, error = %e, "Failed to persist budget");
        }
        snapshot.status()
    }
}

/// Longest hold accepted, one year
const MAX_RESERVATION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

fn ttl_from_secs(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs.min(MAX_RESERVATION_TTL_SECS)).unwrap_or(1))
}

fn validate_limit(limit_cents: f64) -> Result<()> {
    if limit_cents.is_finite() && limit_cents > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidBudget(format!(
            "limit must be a positive amount, got {limit_cents}"
        )))
    }
}

/// Holds from an earlier period were already cleared by rollover
fn release_hold(budget: &mut Budget, reservation: &Reservation) {
    if budget.period_start == reservation.period_start {
        budget.reserved_cents = (budget.reserved_cents - reservation.amount_cents).max(0.0);
    }
}

fn signal_thresholds(budget: &mut Budget) -> Vec<GatewayEvent> {
    let percent_used = budget.raw_percent_used();
    let mut events = Vec::new();

    let crossed: Vec<f64> = budget
        .alert_thresholds
        .iter()
        .copied()
        .filter(|t| percent_used >= *t && !budget.signaled_thresholds.contains(t))
        .collect();
    for threshold in crossed {
        warn!(budget_id = %budget.id, threshold, percent_used, "Budget threshold crossed");
        budget.signaled_thresholds.push(threshold);
        events.push(GatewayEvent::BudgetWarning {
            budget_id: budget.id.clone(),
            threshold,
            percent_used,
        });
    }

    if percent_used >= 100.0 && !budget.exceeded_signaled {
        warn!(
            budget_id = %budget.id,
            spent_cents = budget.spent_cents,
            limit_cents = budget.effective_limit_cents(),
            "Budget exceeded"
        );
        budget.exceeded_signaled = true;
        events.push(GatewayEvent::BudgetExceeded {
            budget_id: budget.id.clone(),
            spent_cents: budget.spent_cents,
            limit_cents: budget.effective_limit_cents(),
        });
    }

    events
}
