//! Per-million-token pricing used to turn usage into a run cost.

use serde::{Deserialize, Serialize};
use stepwise_core::generation::Usage;

/// Prices are in USD per 1 million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_m: f64,
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }

    pub fn cost_of(&self, usage: &Usage) -> f64 {
        self.cost(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_per_million() {
        let pricing = ModelPricing::new(3.0, 7.0);
        let cost = pricing.cost(1_000_000, 500_000);
        assert!((cost - 6.5).abs() < 1e-9);
    }

    #[test]
    fn usage_cost_ignores_total() {
        let pricing = ModelPricing::new(1.0, 2.0);
        let usage = Usage {
            prompt_tokens: 1000,
            completion_tokens: 1000,
            total_tokens: 999_999,
        };
        assert!((pricing.cost_of(&usage) - 0.003).abs() < 1e-12);
    }

    #[test]
    fn free_by_default() {
        assert_eq!(ModelPricing::default().cost(10_000, 10_000), 0.0);
    }
}
