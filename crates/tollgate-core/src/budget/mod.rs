//! Budget Manager - spend tracking with limits, alerts and rollover
//!
//! All amounts are in cents.
//!
//! # Module Structure
//!
//! - `types`: Budget, BudgetPeriod, BudgetStatus, Reservation
//! - `store`: BudgetStore collaborator trait and in-memory store
//! - `manager`: BudgetManager implementation

mod manager;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use manager::{BudgetManager, DEFAULT_RESERVATION_TTL_SECS};
pub use store::{BudgetStore, InMemoryBudgetStore};
pub use types::{
    Budget, BudgetOptions, BudgetPeriod, BudgetStatus, BudgetUpdate, Reservation,
};
