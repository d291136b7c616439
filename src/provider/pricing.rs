//! Per-million-token pricing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub const FREE: Self = Self::new(0.0, 0.0);

    pub const fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    pub fn calculate(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input = (input_tokens as f64 / 1_000_000.0) * self.input_per_mtok;
        let output = (output_tokens as f64 / 1_000_000.0) * self.output_per_mtok;
        input + output
    }

    pub fn is_free(&self) -> bool {
        self.input_per_mtok == 0.0 && self.output_per_mtok == 0.0
    }
}

/// Pricing as reported by a provider adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPricing {
    pub provider_id: String,
    pub provider_name: String,
    pub input_cost_per_1m: f64,
    pub output_cost_per_1m: f64,
}

impl ProviderPricing {
    pub fn new(
        provider_id: impl Into<String>,
        provider_name: impl Into<String>,
        pricing: ModelPricing,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_name: provider_name.into(),
            input_cost_per_1m: pricing.input_per_mtok,
            output_cost_per_1m: pricing.output_per_mtok,
        }
    }

    pub fn model_pricing(&self) -> ModelPricing {
        ModelPricing::new(self.input_cost_per_1m, self.output_cost_per_1m)
    }
}
