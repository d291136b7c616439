//! Provider adapter contract.
//!
//! Vendor adapters implement [`LlmProvider`]; everything in this crate talks
//! to them through `Arc<dyn LlmProvider>` so adapters are interchangeable.

mod error;
#[cfg(test)]
pub(crate) mod mock;
mod pricing;

pub use error::{DEFAULT_RETRY_AFTER, ProviderError, RATE_LIMIT_CODE};
pub use pricing::{ModelPricing, ProviderPricing};

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop_sequence(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl GenerateResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync + Debug {
    async fn generate(&self, request: &GenerateRequest)
    -> Result<GenerateResponse, ProviderError>;

    fn model_name(&self) -> &str;

    async fn is_available(&self) -> bool {
        true
    }

    fn pricing(&self) -> ProviderPricing;

    fn provider_id(&self) -> &str;
}
