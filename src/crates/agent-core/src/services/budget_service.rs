//! Budget service: enforcing limits and tracking usage against in-memory
//! budgets (C8 budget accounting, §4.6).
//!
//! Backed by a plain `RwLock<HashMap<String, Budget>>` (concrete budget
//! persistence is out of scope; `RunStore`/`MemoryStore` capabilities cover
//! persisted state, and budgets are process-lifetime accounting, not
//! durable records).

use crate::error::{CoreError, Result};
use crate::models::{Budget, BudgetEnforcement, BudgetType};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct BudgetService {
    budgets: Arc<RwLock<HashMap<String, Budget>>>,
}

impl BudgetService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, budget: Budget) {
        self.budgets.write().await.insert(budget.id.clone(), budget);
    }

    pub async fn check_budget(&self, budget_id: &str) -> Result<BudgetStatus> {
        let budgets = self.budgets.read().await;
        let budget = budgets
            .get(budget_id)
            .ok_or_else(|| CoreError::NotFound(format!("budget not found: {budget_id}")))?;

        Ok(BudgetStatus {
            is_exceeded: budget.is_exceeded(),
            should_warn: budget.should_warn(),
            usage_percentage: budget.usage_percentage(),
            remaining: budget.remaining(),
            enforcement: budget.enforcement,
        })
    }

    pub async fn track_cost(&self, budget_id: &str, cost: f64) -> Result<()> {
        let mut budgets = self.budgets.write().await;
        let budget = budgets
            .get_mut(budget_id)
            .ok_or_else(|| CoreError::NotFound(format!("budget not found: {budget_id}")))?;

        if budget.enforcement == BudgetEnforcement::Block && budget.is_exceeded() {
            return Err(CoreError::BudgetExceeded(budget.name.clone()));
        }

        budget.current_usage += cost;
        Ok(())
    }

    pub async fn process_renewal(&self, budget_id: &str) -> Result<()> {
        let mut budgets = self.budgets.write().await;
        let budget = budgets
            .get_mut(budget_id)
            .ok_or_else(|| CoreError::NotFound(format!("budget not found: {budget_id}")))?;

        if budget.budget_type != BudgetType::Recurring {
            return Ok(());
        }

        let now = Utc::now().timestamp();
        if let Some(next_renewal) = budget.next_renewal_date {
            if now >= next_renewal {
                budget.current_usage = 0.0;
                budget.last_renewal_date = Some(now);
                if let (Some(unit), Some(value)) = (budget.renewal_interval_unit, budget.renewal_interval_value) {
                    let days = unit.to_days(value) as i64 * 86_400;
                    budget.next_renewal_date = Some(now + days);
                }
            }
        }
        Ok(())
    }

    pub async fn refresh_all_budgets(&self) {
        let ids: Vec<String> = self.budgets.read().await.keys().cloned().collect();
        for id in ids {
            let _ = self.process_renewal(&id).await;
        }
    }

    pub async fn should_allow_request(&self, budget_id: &str) -> Result<bool> {
        let budgets = self.budgets.read().await;
        let budget = budgets
            .get(budget_id)
            .ok_or_else(|| CoreError::NotFound(format!("budget not found: {budget_id}")))?;

        Ok(match budget.enforcement {
            BudgetEnforcement::Block => !budget.is_exceeded(),
            BudgetEnforcement::Warn => true,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BudgetStatus {
    pub is_exceeded: bool,
    pub should_warn: bool,
    pub usage_percentage: f64,
    pub remaining: f64,
    pub enforcement: BudgetEnforcement,
}

impl BudgetStatus {
    pub fn message(&self) -> String {
        if self.is_exceeded {
            "budget limit exceeded".to_string()
        } else {
            format!("budget usage at {:.1}% - {:.2} remaining", self.usage_percentage, self.remaining)
        }
    }
}
