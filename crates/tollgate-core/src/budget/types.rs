//! Budget records, periods and status snapshots

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Period
// ============================================================================

/// Budget reset cadence, aligned to UTC calendar boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    /// Resets at 00:00 UTC
    Daily,
    /// Resets at 00:00 UTC on the first of the month
    #[default]
    Monthly,
}

impl BudgetPeriod {
    /// Start of the period containing `at`
    #[must_use]
    pub fn start_of(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = match self {
            Self::Daily => at.date_naive(),
            Self::Monthly => NaiveDate::from_ymd_opt(at.year(), at.month(), 1)
                .unwrap_or_else(|| at.date_naive()),
        };
        Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
    }

    /// Start of the period after the one starting at `start`
    #[must_use]
    pub fn next_start(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => self.start_of(start) + Duration::days(1),
            Self::Monthly => {
                let (year, month) = if start.month() == 12 {
                    (start.year() + 1, 1)
                } else {
                    (start.year(), start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
                    .map(|d| Utc.from_utc_datetime(&d.and_time(chrono::NaiveTime::MIN)))
                    .unwrap_or_else(|| start + Duration::days(31))
            }
        }
    }

    /// Number of period boundaries between `start` and `now`
    #[must_use]
    pub fn periods_between(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
        let index = |at: DateTime<Utc>| -> i64 {
            match self {
                Self::Daily => i64::from(at.date_naive().num_days_from_ce()),
                Self::Monthly => i64::from(at.year()) * 12 + i64::from(at.month0()),
            }
        };
        u32::try_from((index(now) - index(start)).max(0)).unwrap_or(u32::MAX)
    }
}

// ============================================================================
// Budget
// ============================================================================

/// Optional settings for a new budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetOptions {
    /// Percentages that trigger a warning, e.g. `[50, 80, 100]`
    pub alert_thresholds: Vec<f64>,
    /// Block spending past the limit
    pub hard_limit: bool,
    /// Carry unspent balance into the next period
    pub rollover: bool,
}

impl Default for BudgetOptions {
    fn default() -> Self {
        Self {
            alert_thresholds: vec![50.0, 80.0, 100.0],
            hard_limit: false,
            rollover: false,
        }
    }
}

/// Partial update to an existing budget
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetUpdate {
    /// New display name
    pub name: Option<String>,
    /// New base limit in cents
    pub limit_cents: Option<f64>,
    /// New alert thresholds
    pub alert_thresholds: Option<Vec<f64>>,
    /// New hard-limit flag
    pub hard_limit: Option<bool>,
    /// New rollover flag
    pub rollover: Option<bool>,
}

/// A spending budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Budget id
    pub id: String,
    /// Display name
    pub name: String,
    /// Base limit per period, in cents
    pub limit_cents: f64,
    /// Reset cadence
    pub period: BudgetPeriod,
    /// Ascending alert percentages
    pub alert_thresholds: Vec<f64>,
    /// Block spending past the limit
    pub hard_limit: bool,
    /// Carry unspent balance into the next period
    pub rollover: bool,
    /// Spent this period, in cents
    pub spent_cents: f64,
    /// Held by open reservations this period, in cents
    #[serde(default)]
    pub reserved_cents: f64,
    /// Balance carried in from the previous period, in cents
    #[serde(default)]
    pub carried_over_cents: f64,
    /// Start of the current period
    pub period_start: DateTime<Utc>,
    /// Thresholds already signaled this period
    #[serde(default)]
    pub signaled_thresholds: Vec<f64>,
    /// Whether the exceeded notification fired this period
    #[serde(default)]
    pub exceeded_signaled: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Bumped on every persisted mutation; stores keep the highest
    #[serde(default)]
    pub version: u64,
}

impl Budget {
    pub(crate) fn new(
        id: String,
        name: String,
        limit_cents: f64,
        period: BudgetPeriod,
        options: BudgetOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            limit_cents,
            period,
            alert_thresholds: normalize_thresholds(options.alert_thresholds),
            hard_limit: options.hard_limit,
            rollover: options.rollover,
            spent_cents: 0.0,
            reserved_cents: 0.0,
            carried_over_cents: 0.0,
            period_start: period.start_of(now),
            signaled_thresholds: Vec::new(),
            exceeded_signaled: false,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Limit for the current period including any carried balance
    #[must_use]
    pub fn effective_limit_cents(&self) -> f64 {
        self.limit_cents + self.carried_over_cents
    }

    /// Unspent balance, never negative
    #[must_use]
    pub fn remaining_cents(&self) -> f64 {
        (self.effective_limit_cents() - self.spent_cents).max(0.0)
    }

    /// Raw spend percentage, unclamped
    #[must_use]
    pub(crate) fn raw_percent_used(&self) -> f64 {
        let limit = self.effective_limit_cents();
        if limit > 0.0 {
            self.spent_cents / limit * 100.0
        } else if self.spent_cents > 0.0 {
            100.0
        } else {
            0.0
        }
    }

    /// Spend percentage; capped at 100 for hard-limited budgets
    #[must_use]
    pub fn percent_used(&self) -> f64 {
        let pct = self.raw_percent_used();
        if self.hard_limit {
            pct.min(100.0)
        } else {
            pct
        }
    }

    /// Whether `amount_cents` more may be spent
    ///
    /// Soft budgets always allow; hard budgets count open reservations.
    #[must_use]
    pub fn can_spend(&self, amount_cents: f64) -> bool {
        !self.hard_limit
            || self.spent_cents + self.reserved_cents + amount_cents
                <= self.effective_limit_cents()
    }

    /// Apply any period rollover due at `now`, returning whether one happened
    pub(crate) fn roll_forward(&mut self, now: DateTime<Utc>) -> bool {
        let elapsed = self.period.periods_between(self.period_start, now);
        if elapsed == 0 {
            return false;
        }

        self.carried_over_cents = match (self.rollover, elapsed) {
            (false, _) => 0.0,
            // Only the immediately preceding period carries its balance
            (true, 1) => (self.limit_cents - self.spent_cents).max(0.0),
            (true, _) => self.limit_cents,
        };
        self.spent_cents = 0.0;
        self.reserved_cents = 0.0;
        self.signaled_thresholds.clear();
        self.exceeded_signaled = false;
        self.period_start = self.period.start_of(now);
        self.updated_at = now;
        true
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn status(&self) -> BudgetStatus {
        BudgetStatus {
            budget_id: self.id.clone(),
            spent_cents: self.spent_cents,
            reserved_cents: self.reserved_cents,
            limit_cents: self.effective_limit_cents(),
            remaining_cents: self.remaining_cents(),
            percent_used: self.percent_used(),
            hard_limit: self.hard_limit,
            period_start: self.period_start,
            period_end: self.period.next_start(self.period_start),
        }
    }
}

/// Sort ascending, drop non-positive values and duplicates
pub(crate) fn normalize_thresholds(mut thresholds: Vec<f64>) -> Vec<f64> {
    thresholds.retain(|t| t.is_finite() && *t > 0.0);
    thresholds.sort_by(f64::total_cmp);
    thresholds.dedup();
    thresholds
}

/// Point-in-time budget status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// Budget id
    pub budget_id: String,
    /// Spent this period, in cents
    pub spent_cents: f64,
    /// Held by open reservations, in cents
    pub reserved_cents: f64,
    /// Effective limit this period, in cents
    pub limit_cents: f64,
    /// `max(0, limit - spent)`
    pub remaining_cents: f64,
    /// Percentage used
    pub percent_used: f64,
    /// Whether spending past the limit is blocked
    pub hard_limit: bool,
    /// Start of the current period
    pub period_start: DateTime<Utc>,
    /// Start of the next period
    pub period_end: DateTime<Utc>,
}

/// Amount held against a budget for one in-flight request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Request id the hold belongs to
    pub request_id: String,
    /// Budget id
    pub budget_id: String,
    /// Held amount, in cents
    pub amount_cents: f64,
    /// Period the hold was taken in
    pub period_start: DateTime<Utc>,
    /// When the hold lapses if the request never reports back
    pub expires_at: DateTime<Utc>,
}
