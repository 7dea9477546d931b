//! Usage Tracker - per-request usage facts and summaries
//!
//! # Module Structure
//!
//! - `types`: UsageRecord, UsageFilter, UsageSummary
//! - `store`: UsageStore collaborator trait and bounded in-memory store
//! - `tracker`: UsageTracker implementation

mod store;
mod tracker;
mod types;

#[cfg(test)]
mod tests;

pub use store::{InMemoryUsageStore, UsageStore, DEFAULT_MAX_RECORDS};
#[cfg(test)]
pub(crate) use store::MockUsageStore;
pub use tracker::UsageTracker;
pub use types::{UsageBreakdown, UsageFilter, UsageRecord, UsageSummary};
