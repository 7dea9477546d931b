//! Budget persistence contract

use super::types::Budget;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[cfg(test)]
use mockall::automock;

/// Budget store collaborator
///
/// Implementations back budgets with a database; the manager keeps the
/// working copy in memory and writes through.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Persist a new budget
    async fn create(&self, budget: &Budget) -> Result<()>;

    /// Fetch a budget by id
    async fn get(&self, id: &str) -> Result<Option<Budget>>;

    /// Replace a stored budget
    ///
    /// Writes can arrive out of order; a snapshot whose `version` is lower
    /// than the stored one must be ignored.
    async fn update(&self, budget: &Budget) -> Result<()>;

    /// Remove a budget, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// All stored budgets
    async fn list(&self) -> Result<Vec<Budget>>;
}

/// Process-local budget store
#[derive(Debug, Default)]
pub struct InMemoryBudgetStore {
    budgets: RwLock<HashMap<String, Budget>>,
}

impl InMemoryBudgetStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BudgetStore for InMemoryBudgetStore {
    async fn create(&self, budget: &Budget) -> Result<()> {
        self.budgets
            .write()
            .await
            .insert(budget.id.clone(), budget.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Budget>> {
        Ok(self.budgets.read().await.get(id).cloned())
    }

    async fn update(&self, budget: &Budget) -> Result<()> {
        let mut budgets = self.budgets.write().await;
        match budgets.get(&budget.id) {
            Some(stored) if stored.version > budget.version => {}
            _ => {
                budgets.insert(budget.id.clone(), budget.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.budgets.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<Budget>> {
        let mut budgets: Vec<Budget> = self.budgets.read().await.values().cloned().collect();
        budgets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(budgets)
    }
}
