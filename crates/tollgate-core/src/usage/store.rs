//! Usage persistence contract

use super::types::{UsageFilter, UsageRecord};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;

#[cfg(test)]
use mockall::automock;

/// Maximum records the in-memory store keeps by default
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Usage store collaborator
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Persist one record
    async fn insert(&self, record: &UsageRecord) -> Result<()>;

    /// Records matching a filter, oldest first
    async fn query(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>>;
}

/// Process-local usage store with a bounded record count
///
/// Oldest records are evicted first once the cap is reached.
#[derive(Debug)]
pub struct InMemoryUsageStore {
    records: RwLock<VecDeque<UsageRecord>>,
    max_records: usize,
}

impl Default for InMemoryUsageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUsageStore {
    /// Create a store with the default cap
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_records(DEFAULT_MAX_RECORDS)
    }

    /// Create a store with a custom cap
    #[must_use]
    pub fn with_max_records(max: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            max_records: max.max(1),
        }
    }

    /// Number of retained records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether no records are retained
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn insert(&self, record: &UsageRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push_back(record.clone());
        while records.len() > self.max_records {
            records.pop_front();
        }
        Ok(())
    }

    async fn query(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}
