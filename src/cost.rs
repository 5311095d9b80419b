//! Token cost estimation from the pricing table.

use crate::config::ModelPricing;
use serde::{Deserialize, Serialize};

const PER_MILLION: f64 = 1_000_000.0;

/// Cost of one exchange, in the pricing table's currency (USD by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCost {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
}

impl TokenCost {
    pub fn calculate(
        input_tokens: u64,
        output_tokens: u64,
        pricing: &ModelPricing,
        model: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            input_tokens,
            output_tokens,
            input_cost: input_tokens as f64 / PER_MILLION * pricing.input,
            output_cost: output_tokens as f64 / PER_MILLION * pricing.output,
        }
    }

    /// Cost of a prompt alone, e.g. to estimate before sending
    pub fn for_input(input_tokens: u64, pricing: &ModelPricing, model: impl Into<String>) -> Self {
        Self::calculate(input_tokens, 0, pricing, model)
    }

    pub fn total(&self) -> f64 {
        self.input_cost + self.output_cost
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// `"$0.010500"` style rendering
    pub fn formatted(&self, currency: &str, decimals: usize) -> String {
        format!("{currency}{:.decimals$}", self.total())
    }

    /// Flat JSON summary including totals
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "input_tokens": self.input_tokens,
            "output_tokens": self.output_tokens,
            "input_cost": self.input_cost,
            "output_cost": self.output_cost,
            "total_cost": self.total(),
            "total_tokens": self.total_tokens(),
        })
    }
}

impl std::fmt::Display for TokenCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.formatted("$", 6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SONNET: ModelPricing = ModelPricing::new(3.0, 15.0);

    #[test]
    fn test_calculate() {
        let cost = TokenCost::calculate(1000, 500, &SONNET, "claude-sonnet-4-5");

        assert!((cost.input_cost - 0.003).abs() < 1e-12);
        assert!((cost.output_cost - 0.0075).abs() < 1e-12);
        assert!((cost.total() - 0.0105).abs() < 1e-12);
        assert_eq!(cost.total_tokens(), 1500);
        assert_eq!(cost.formatted("$", 6), "$0.010500");
        assert_eq!(cost.to_string(), "$0.010500");
    }

    #[test]
    fn test_for_input() {
        let cost = TokenCost::for_input(2_000_000, &SONNET, "claude-sonnet-4-5");
        assert_eq!(cost.output_tokens, 0);
        assert_eq!(cost.formatted("€", 2), "€6.00");
    }

    #[test]
    fn test_to_json() {
        let json = TokenCost::calculate(10, 50, &SONNET, "m").to_json();
        assert_eq!(json["total_tokens"], 60);
        assert_eq!(json["model"], "m");
        assert!(json["total_cost"].as_f64().unwrap() > 0.0);
    }
}
