//! Model-pricing capability (§4.6, §6) backing the Agent Run Engine's cost accounting.
//!
//! Pricing rows were originally persisted in sqlite; the core has no database
//! of its own (`RunStore`/`MemoryStore` are capabilities the embedder supplies),
//! so this keeps an in-process table seeded from [`default_pricing`] and
//! updatable at runtime.

use crate::models::{default_pricing, LlmPricing};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process model-pricing table keyed by `(provider, model)`.
#[derive(Clone, Debug)]
pub struct PricingService {
    table: Arc<RwLock<HashMap<(String, String), LlmPricing>>>,
}

impl Default for PricingService {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingService {
    /// Create a pricing service seeded with [`default_pricing`].
    pub fn new() -> Self {
        let mut table = HashMap::new();
        for (provider, model, input_cost, output_cost, reasoning_cost) in default_pricing() {
            table.insert(
                (provider.to_string(), model.to_string()),
                LlmPricing {
                    id: Uuid::new_v4().to_string(),
                    provider: provider.to_string(),
                    model: model.to_string(),
                    cost_per_input_token: input_cost,
                    cost_per_output_token: output_cost,
                    cost_per_reasoning_token: reasoning_cost,
                    updated_at: Utc::now().timestamp(),
                },
            );
        }
        Self {
            table: Arc::new(RwLock::new(table)),
        }
    }

    /// Create a pricing service with no seeded entries (every lookup is free
    /// until [`Self::update_pricing`] populates the table).
    pub fn empty() -> Self {
        Self {
            table: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look up pricing for a `(provider, model)` pair; unknown pairs price as
    /// free rather than erroring, since a missing price should not block a run.
    pub async fn get_pricing(&self, provider: &str, model: &str) -> LlmPricing {
        let table = self.table.read().await;
        table
            .get(&(provider.to_string(), model.to_string()))
            .cloned()
            .unwrap_or_else(|| LlmPricing {
                id: "unknown".to_string(),
                provider: provider.to_string(),
                model: model.to_string(),
                cost_per_input_token: 0.0,
                cost_per_output_token: 0.0,
                cost_per_reasoning_token: None,
                updated_at: Utc::now().timestamp(),
            })
    }

    /// Compute the dollar cost of a turn from its token usage.
    pub async fn calculate_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: usize,
        output_tokens: usize,
        reasoning_tokens: Option<usize>,
    ) -> f64 {
        self.get_pricing(provider, model)
            .await
            .calculate_cost(input_tokens, output_tokens, reasoning_tokens)
    }

    /// Insert or overwrite the price for a `(provider, model)` pair.
    pub async fn update_pricing(
        &self,
        provider: &str,
        model: &str,
        cost_per_input_token: f64,
        cost_per_output_token: f64,
        cost_per_reasoning_token: Option<f64>,
    ) {
        let mut table = self.table.write().await;
        let key = (provider.to_string(), model.to_string());
        let id = table
            .get(&key)
            .map(|p| p.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        table.insert(
            key,
            LlmPricing {
                id,
                provider: provider.to_string(),
                model: model.to_string(),
                cost_per_input_token,
                cost_per_output_token,
                cost_per_reasoning_token,
                updated_at: Utc::now().timestamp(),
            },
        );
    }

    /// List every priced `(provider, model)` pair, sorted for stable output.
    pub async fn list_all_pricing(&self) -> Vec<LlmPricing> {
        let table = self.table.read().await;
        let mut pricing: Vec<LlmPricing> = table.values().cloned().collect();
        pricing.sort_by(|a, b| {
            (a.provider.as_str(), a.model.as_str()).cmp(&(b.provider.as_str(), b.model.as_str()))
        });
        pricing
    }
}
