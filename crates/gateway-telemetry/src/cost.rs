//! Cost calculation for LLM usage.
//!
//! Prices are stored per million tokens. Cost is advisory: a missing price
//! or failed lookup falls back to a flat rate instead of failing accounting.

use gateway_core::{ModelPricing, ModelStore, TokenUsage};
use std::sync::Arc;
use tracing::{debug, warn};

/// Flat fallback rate in USD per 1K tokens.
pub const FALLBACK_COST_PER_1K: f64 = 0.002;

/// Cost for `usage` under `pricing`, if both prices are positive.
#[must_use]
pub fn priced_cost(pricing: &ModelPricing, usage: &TokenUsage) -> Option<f64> {
    let input = pricing.input_cost_per_1m.filter(|p| *p > 0.0)?;
    let output = pricing.output_cost_per_1m.filter(|p| *p > 0.0)?;

    let input_per_1k = input / 1000.0;
    let output_per_1k = output / 1000.0;
    Some(
        (usage.prompt_tokens as f64 / 1000.0) * input_per_1k
            + (usage.completion_tokens as f64 / 1000.0) * output_per_1k,
    )
}

/// Flat-rate cost over the total token count.
#[must_use]
pub fn fallback_cost(usage: &TokenUsage) -> f64 {
    (usage.total_tokens as f64 / 1000.0) * FALLBACK_COST_PER_1K
}

/// Converts token usage into USD using stored model pricing.
#[derive(Clone)]
pub struct CostCalculator {
    models: Arc<dyn ModelStore>,
}

impl std::fmt::Debug for CostCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostCalculator").finish_non_exhaustive()
    }
}

impl CostCalculator {
    /// Create a calculator reading prices from `models`.
    pub fn new(models: Arc<dyn ModelStore>) -> Self {
        Self { models }
    }

    /// Cost of `usage` for the model with storage id `model_id`.
    pub async fn calculate(&self, model_id: &str, usage: &TokenUsage) -> f64 {
        match self.models.model_pricing(model_id).await {
            Ok(Some(pricing)) => {
                if let Some(cost) = priced_cost(&pricing, usage) {
                    debug!(model_id, cost, "priced usage");
                    return cost;
                }
                debug!(model_id, "model has no pricing, using fallback rate");
            }
            Ok(None) => debug!(model_id, "model not found, using fallback rate"),
            Err(e) => warn!(model_id, error = %e, "pricing lookup failed, using fallback rate"),
        }
        fallback_cost(usage)
    }
}
