//! Per-tenant token budgets
//!
//! A [`TokenBudget`] is the usage ceiling constraining how much paid
//! external-model capacity a tenant may consume in a period. It is the one
//! piece of state mutated by concurrent executions across different work
//! items for the same tenant.
//!
//! The check-then-consume sequence performed by the budget gate is **not**
//! atomic across concurrent executions: two steps can both observe enough
//! remaining allotment and jointly overshoot the ceiling. This is a known,
//! deliberate tolerance - `consumed` never exceeds `total` in the steady
//! state, only under races. A strict ceiling would need a reserve/commit
//! API on [`BudgetService`].

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tenant-scoped usage ceiling for one period
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenBudget {
    /// Tenant the budget belongs to
    pub tenant_id: String,
    /// Total allotment for the period
    pub total: u64,
    /// Amount consumed so far
    pub used: u64,
    /// Period start
    pub period_start: DateTime<Utc>,
    /// Period end
    pub period_end: DateTime<Utc>,
}

impl TokenBudget {
    /// Create a budget for the next 30 days
    pub fn new(tenant_id: impl Into<String>, total: u64) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            total,
            used: 0,
            period_start: now,
            period_end: now + chrono::Duration::days(30),
        }
    }

    /// Allotment left in the current period
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }

    /// Whether spending `cost` would exceed the ceiling
    pub fn would_exceed(&self, cost: u64) -> bool {
        cost > self.remaining()
    }
}

/// One recorded consumption against a budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Tenant charged
    pub tenant_id: String,
    /// Tokens consumed
    pub amount: u64,
    /// What consumed them (agent name)
    pub source: String,
    /// Work item the consumption belongs to
    pub work_item_id: String,
    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Usage budget service consumed by the budget gate
#[async_trait]
pub trait BudgetService: Send + Sync {
    /// Current budget for a tenant
    async fn get_budget(&self, tenant_id: &str) -> Result<TokenBudget>;

    /// Record consumption against the tenant's budget
    async fn record_usage(
        &self,
        tenant_id: &str,
        amount: u64,
        source: &str,
        work_item_id: &str,
    ) -> Result<()>;
}

/// In-memory budget service for tests and single-process hosts
#[derive(Debug, Clone, Default)]
pub struct InMemoryBudgetService {
    budgets: Arc<RwLock<HashMap<String, TokenBudget>>>,
    records: Arc<RwLock<Vec<UsageRecord>>>,
}

impl InMemoryBudgetService {
    /// Create an empty service
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a tenant's budget
    pub async fn set_budget(&self, budget: TokenBudget) {
        self.budgets
            .write()
            .await
            .insert(budget.tenant_id.clone(), budget);
    }

    /// Recorded usage entries, in order
    pub async fn usage_records(&self) -> Vec<UsageRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl BudgetService for InMemoryBudgetService {
    async fn get_budget(&self, tenant_id: &str) -> Result<TokenBudget> {
        let budgets = self.budgets.read().await;
        // Unknown tenants get an unlimited budget; provisioning budgets is
        // a host concern.
        Ok(budgets
            .get(tenant_id)
            .cloned()
            .unwrap_or_else(|| TokenBudget::new(tenant_id, u64::MAX)))
    }

    async fn record_usage(
        &self,
        tenant_id: &str,
        amount: u64,
        source: &str,
        work_item_id: &str,
    ) -> Result<()> {
        {
            let mut budgets = self.budgets.write().await;
            if let Some(budget) = budgets.get_mut(tenant_id) {
                budget.used = budget.used.saturating_add(amount);
            }
        }
        self.records.write().await.push(UsageRecord {
            tenant_id: tenant_id.to_string(),
            amount,
            source: source.to_string(),
            work_item_id: work_item_id.to_string(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_and_would_exceed() {
        let mut budget = TokenBudget::new("tenant-a", 10_000);
        budget.used = 9_900;
        assert_eq!(budget.remaining(), 100);
        assert!(budget.would_exceed(1_000));
        assert!(!budget.would_exceed(100));
    }

    #[test]
    fn remaining_saturates_past_ceiling() {
        let mut budget = TokenBudget::new("tenant-a", 100);
        budget.used = 250; // overshoot from a race
        assert_eq!(budget.remaining(), 0);
        assert!(budget.would_exceed(1));
    }

    #[tokio::test]
    async fn record_usage_accumulates() {
        let service = InMemoryBudgetService::new();
        service.set_budget(TokenBudget::new("tenant-a", 10_000)).await;

        service
            .record_usage("tenant-a", 1_500, "planner", "wi-1")
            .await
            .unwrap();
        service
            .record_usage("tenant-a", 500, "reviewer", "wi-1")
            .await
            .unwrap();

        let budget = service.get_budget("tenant-a").await.unwrap();
        assert_eq!(budget.used, 2_000);

        let records = service.usage_records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "planner");
    }

    #[tokio::test]
    async fn unknown_tenant_is_unlimited() {
        let service = InMemoryBudgetService::new();
        let budget = service.get_budget("nobody").await.unwrap();
        assert_eq!(budget.total, u64::MAX);
    }
}
