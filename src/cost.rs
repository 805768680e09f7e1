//! Per-turn cost/usage tracking.
//!
//! Supplements `Message.usage` (prompt/completion tokens, cost estimate)
//! with the running aggregate a group chat actually wants to show the
//! user: total spend across every speaker in a turn, broken down per
//! participant. A per-participant pricing map rather than a fixed
//! provider pair, since the participant roster here is configured rather
//! than hardcoded.

use std::collections::HashMap;

/// Dollars per million tokens, input and output priced separately — the
/// shape every provider's published pricing takes.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self { input_per_million, output_per_million }
    }

    fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// A participant id → pricing lookup. Participants absent from the table
/// cost nothing to estimate (`cost_estimate` stays 0.0) rather than
/// failing the turn — pricing is an estimate, not a billing record.
#[derive(Debug, Clone, Default)]
pub struct PricingTable(HashMap<String, ModelPricing>);

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, participant_id: impl Into<String>, pricing: ModelPricing) -> Self {
        self.0.insert(participant_id.into(), pricing);
        self
    }

    pub fn get(&self, participant_id: &str) -> Option<ModelPricing> {
        self.0.get(participant_id).copied()
    }

    /// Estimate the USD cost of one generation, 0.0 if the participant has
    /// no configured pricing.
    pub fn estimate(&self, participant_id: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        self.get(participant_id)
            .map(|p| p.cost(prompt_tokens, completion_tokens))
            .unwrap_or(0.0)
    }
}

/// Running per-participant token/cost totals for one turn. Not persisted
/// directly — it is a live aggregate the Turn Executor updates as each
/// speaker completes and the UI collaborator can read back for a
/// "this turn cost $x" footer.
#[derive(Debug, Clone, Default)]
pub struct CostTracker {
    totals: HashMap<String, (u64, u64)>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, participant_id: &str, prompt_tokens: u32, completion_tokens: u32) {
        let entry = self.totals.entry(participant_id.to_string()).or_insert((0, 0));
        entry.0 += prompt_tokens as u64;
        entry.1 += completion_tokens as u64;
    }

    pub fn tokens_for(&self, participant_id: &str) -> (u64, u64) {
        self.totals.get(participant_id).copied().unwrap_or((0, 0))
    }

    pub fn total_cost(&self, pricing: &PricingTable) -> f64 {
        self.totals
            .iter()
            .map(|(id, (input, output))| pricing.estimate(id, *input as u32, *output as u32))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpriced_participant_estimates_zero() {
        let table = PricingTable::new();
        assert_eq!(table.estimate("claude", 1000, 1000), 0.0);
    }

    #[test]
    fn estimate_matches_hand_computed_cost() {
        let table = PricingTable::new().with("claude", ModelPricing::new(3.0, 15.0));
        let cost = table.estimate("claude", 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn tracker_aggregates_across_multiple_records() {
        let mut tracker = CostTracker::new();
        tracker.record("claude", 100, 50);
        tracker.record("claude", 200, 25);
        tracker.record("gpt", 10, 10);

        assert_eq!(tracker.tokens_for("claude"), (300, 75));
        assert_eq!(tracker.tokens_for("gpt"), (10, 10));
        assert_eq!(tracker.tokens_for("gemini"), (0, 0));
    }

    #[test]
    fn total_cost_sums_per_participant_estimates() {
        let mut tracker = CostTracker::new();
        tracker.record("claude", 1_000_000, 0);
        tracker.record("gpt", 0, 1_000_000);
        let pricing = PricingTable::new()
            .with("claude", ModelPricing::new(3.0, 15.0))
            .with("gpt", ModelPricing::new(2.5, 10.0));

        assert!((tracker.total_cost(&pricing) - 13.0).abs() < 1e-9);
    }
}
