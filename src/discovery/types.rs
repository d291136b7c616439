use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ModelProfile, ThinkingFormat};

/// What a single probe was testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCapability {
    ToolCalling,
    ThinkTags,
    ReasoningField,
    JsonMode,
}

/// Outcome of one probe request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub capability: ProbeCapability,
    /// Attempt number or tag name, where the probe has variants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub success: bool,
    /// Raw response text, truncated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Empirically measured capabilities of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredCapabilities {
    pub model_id: String,
    pub provider_id: String,
    pub supports_tool_calling: bool,
    /// Share of tool-calling probes that succeeded, in `[0, 1]`.
    pub tool_calling_reliability: f64,
    pub thinking_format: ThinkingFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_tag_name: Option<String>,
    pub supports_json_mode: bool,
    pub max_observed_tokens: u64,
    pub discovered_at: DateTime<Utc>,
    #[serde(default)]
    pub probe_results: Vec<ProbeResult>,
}

impl DiscoveredCapabilities {
    /// Conservative negatives, used as the starting point of a probe run.
    pub fn unknown(model_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            provider_id: provider_id.into(),
            supports_tool_calling: false,
            tool_calling_reliability: 0.0,
            thinking_format: ThinkingFormat::None,
            thinking_tag_name: None,
            supports_json_mode: false,
            max_observed_tokens: 0,
            discovered_at: Utc::now(),
            probe_results: Vec::new(),
        }
    }

    pub fn supports_thinking(&self) -> bool {
        self.thinking_format != ThinkingFormat::None
    }

    pub fn failed_probes(&self) -> impl Iterator<Item = &ProbeResult> {
        self.probe_results.iter().filter(|r| r.error.is_some())
    }

    /// Copy of `profile` with the measured capabilities laid over the
    /// declared ones.
    pub fn overlay(&self, profile: &ModelProfile) -> ModelProfile {
        let mut merged = profile.clone();
        merged.supports_tool_calling = self.supports_tool_calling;
        merged.supports_json_mode = self.supports_json_mode;
        merged.supports_thinking = self.supports_thinking();
        merged.preferred_thinking_format = self.thinking_format;
        merged.think_tag_name = self.thinking_tag_name.clone();
        merged
    }
}
