//! Usage tracker implementation

use super::store::UsageStore;
use super::types::{UsageFilter, UsageRecord, UsageSummary};
use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Records request outcomes and summarizes them
pub struct UsageTracker {
    store: Arc<dyn UsageStore>,
}

impl fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageTracker").finish_non_exhaustive()
    }
}

impl UsageTracker {
    /// Create a tracker over a store
    #[must_use]
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Record an outcome and return its generated id
    ///
    /// Never fails: a store error is logged and the id is still returned.
    pub async fn record(&self, mut record: UsageRecord) -> String {
        record.id = Uuid::new_v4().to_string();
        if let Err(e) = self.store.insert(&record).await {
            warn!(
                record_id = %record.id,
                user_id = %record.user_id,
                error = %e,
                "Failed to persist usage record"
            );
        } else {
            debug!(
                record_id = %record.id,
                model = %record.model,
                success = record.success,
                cost_cents = record.cost_cents,
                "Recorded usage"
            );
        }
        record.id
    }

    /// Records matching a filter, oldest first
    pub async fn get_records(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>> {
        self.store.query(filter).await
    }

    /// Aggregate the records matching a filter
    pub async fn get_summary(&self, filter: &UsageFilter) -> Result<UsageSummary> {
        let records = self.store.query(filter).await?;
        Ok(UsageSummary::from_records(&records))
    }

    /// Most recent records, newest first
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<UsageRecord>> {
        let mut records = self.store.query(&UsageFilter::default()).await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }
}
