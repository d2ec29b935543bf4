//! Curated profile→model pricing table.
//!
//! A profile names a planner/worker provider+model pair the server resolves
//! a run's agents against; this table is the static cost data that
//! resolution is checked against, independent of any budget-service
//! persistence layer.

use std::collections::BTreeMap;

use mesh_events::normalize_model_id;

/// Cost in USD per single input/output/reasoning token for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelPricing {
    pub cost_per_input_token: f64,
    pub cost_per_output_token: f64,
    pub cost_per_reasoning_token: Option<f64>,
}

impl ModelPricing {
    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64, reasoning_tokens: Option<u64>) -> f64 {
        let input_cost = input_tokens as f64 * self.cost_per_input_token;
        let output_cost = output_tokens as f64 * self.cost_per_output_token;
        let reasoning_cost =
            reasoning_tokens.map(|t| t as f64 * self.cost_per_reasoning_token.unwrap_or(0.0)).unwrap_or(0.0);
        input_cost + output_cost + reasoning_cost
    }
}

/// A named planner/worker provider+model pairing a run can be resolved
/// against by name instead of spelling out every field per run.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub name: String,
    pub planner_provider: String,
    pub planner_model: String,
    pub worker_provider: String,
    pub worker_model: String,
}

/// Looks up pricing by `(provider, canonical model id)`, falling back to
/// zero-cost for anything not in the curated table rather than failing the
/// run — an unpriced model is a cost-reporting gap, not a reason to refuse
/// to run it.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    entries: BTreeMap<(String, String), ModelPricing>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from the curated defaults in [`default_pricing`].
    pub fn curated() -> Self {
        let mut table = Self::new();
        for (provider, model, input, output, reasoning) in default_pricing() {
            table.insert(
                provider,
                model,
                ModelPricing {
                    cost_per_input_token: input,
                    cost_per_output_token: output,
                    cost_per_reasoning_token: reasoning,
                },
            );
        }
        table
    }

    pub fn insert(&mut self, provider: &str, model: &str, pricing: ModelPricing) {
        self.entries.insert((provider.to_string(), normalize_model_id(model).to_string()), pricing);
    }

    /// Looks up pricing, normalizing a region-prefixed model id first
    /// (e.g. `us.claude-3-5-sonnet` resolves the same entry as
    /// `claude-3-5-sonnet`).
    pub fn get(&self, provider: &str, model: &str) -> ModelPricing {
        self.entries.get(&(provider.to_string(), normalize_model_id(model).to_string())).copied().unwrap_or_default()
    }

    pub fn calculate_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        reasoning_tokens: Option<u64>,
    ) -> f64 {
        self.get(provider, model).calculate_cost(input_tokens, output_tokens, reasoning_tokens)
    }
}

/// Curated pricing data, USD per token. Mirrors the provider/model pairs
/// this crate's adapters actually speak to.
pub fn default_pricing() -> Vec<(&'static str, &'static str, f64, f64, Option<f64>)> {
    vec![
        ("openai", "gpt-4-turbo", 0.00001, 0.00003, None),
        ("openai", "gpt-4", 0.00003, 0.00006, None),
        ("openai", "gpt-4o", 0.000005, 0.000015, None),
        ("openai", "gpt-3.5-turbo", 0.0000005, 0.0000015, None),
        ("anthropic", "claude-3-opus", 0.000015, 0.000075, None),
        ("anthropic", "claude-3-sonnet", 0.000003, 0.000015, None),
        ("anthropic", "claude-3-haiku", 0.00000025, 0.00000125, None),
        ("anthropic", "claude-3-5-sonnet", 0.000003, 0.000015, None),
        ("anthropic", "claude-3-5-haiku", 0.00000080, 0.000004, None),
        ("google", "gemini-1-5-pro", 0.00000125, 0.000005, None),
        ("google", "gemini-pro", 0.0000005, 0.0000015, None),
        ("ollama", "llama2", 0.0, 0.0, None),
        ("ollama", "mistral", 0.0, 0.0, None),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curated_table_prices_a_known_pair() {
        let table = PricingTable::curated();
        let cost = table.calculate_cost("anthropic", "claude-3-5-sonnet", 1000, 500, None);
        assert!((cost - (1000.0 * 0.000003 + 500.0 * 0.000015)).abs() < 1e-12);
    }

    #[test]
    fn unknown_pair_falls_back_to_zero_cost() {
        let table = PricingTable::curated();
        let cost = table.calculate_cost("unknown-provider", "unknown-model", 1000, 1000, None);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn region_prefixed_model_id_shares_the_canonical_entry() {
        let table = PricingTable::curated();
        let plain = table.get("anthropic", "claude-3-5-sonnet");
        let regioned = table.get("anthropic", "us.claude-3-5-sonnet");
        assert_eq!(plain, regioned);
    }

    #[test]
    fn local_models_are_free() {
        let table = PricingTable::curated();
        assert_eq!(table.calculate_cost("ollama", "llama2", 10_000, 10_000, None), 0.0);
    }
}
