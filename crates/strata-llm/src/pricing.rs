//! Per-model pricing and micro-USD cost calculation.
//!
//! Costs are tracked as integer micro-dollars (USD × 1,000,000) so
//! accounting never accumulates floating-point drift.

use serde::{Deserialize, Serialize};

/// Pricing for one model, in micro-USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Micro-USD per million input tokens.
    pub input_per_million: u64,
    /// Micro-USD per million output tokens.
    pub output_per_million: u64,
}

impl ModelPricing {
    /// Cost of one call in micro-USD.
    #[must_use]
    pub const fn cost_micro_usd(&self, input_tokens: u64, output_tokens: u64) -> u64 {
        let input = input_tokens.saturating_mul(self.input_per_million);
        let output = output_tokens.saturating_mul(self.output_per_million);
        input.saturating_add(output).wrapping_div(1_000_000)
    }

    /// Look up built-in pricing for a model, falling back to a default
    /// mid-tier rate for unknown models.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        // $/Mtok expressed in micro-USD: $3.00 -> 3_000_000.
        match model {
            m if m.starts_with("claude-opus") => Self {
                input_per_million: 15_000_000,
                output_per_million: 75_000_000,
            },
            m if m.starts_with("claude-haiku") || m.contains("haiku") => Self {
                input_per_million: 800_000,
                output_per_million: 4_000_000,
            },
            m if m.starts_with("claude") => Self {
                input_per_million: 3_000_000,
                output_per_million: 15_000_000,
            },
            m if m.starts_with("gpt-4o-mini") => Self {
                input_per_million: 150_000,
                output_per_million: 600_000,
            },
            m if m.starts_with("gpt-4") => Self {
                input_per_million: 2_500_000,
                output_per_million: 10_000_000,
            },
            m if m.starts_with("gemini") => Self {
                input_per_million: 1_250_000,
                output_per_million: 5_000_000,
            },
            _ => Self {
                input_per_million: 1_000_000,
                output_per_million: 3_000_000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_formula() {
        // (in * in_ppm + out * out_ppm) / 1e6
        let pricing = ModelPricing {
            input_per_million: 3_000_000,
            output_per_million: 15_000_000,
        };
        // 1000 in + 100 out: 3000 + 1500 micro-USD
        assert_eq!(pricing.cost_micro_usd(1_000, 100), 4_500);
    }

    #[test]
    fn test_zero_usage_is_free() {
        let pricing = ModelPricing::for_model("claude-sonnet-4-20250514");
        assert_eq!(pricing.cost_micro_usd(0, 0), 0);
    }

    #[test]
    fn test_model_lookup() {
        let opus = ModelPricing::for_model("claude-opus-4");
        let sonnet = ModelPricing::for_model("claude-sonnet-4-20250514");
        assert!(opus.input_per_million > sonnet.input_per_million);

        let unknown = ModelPricing::for_model("mystery-model");
        assert_eq!(unknown.input_per_million, 1_000_000);
    }
}
