use serde::{Deserialize, Serialize};

use crate::provider::ModelPricing;
use crate::{Error, Result};

/// How a model exposes its chain of thought.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingFormat {
    #[default]
    None,
    /// Reasoning wrapped in `<tag>...</tag>` inside the text.
    ThinkTags,
    /// Reasoning returned as a separate structured `reasoning` field.
    ReasoningField,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub name: String,
    /// Case-insensitive regex matched against the normalized model name.
    pub model_pattern: String,
    pub supports_tool_calling: bool,
    pub supports_thinking: bool,
    pub preferred_thinking_format: ThinkingFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think_tag_name: Option<String>,
    pub supports_json_mode: bool,
    pub supports_system_prompt: bool,
    pub supports_vision: bool,
    pub context_window: u32,
    pub max_output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelPricing>,
}

impl ModelProfile {
    /// Profile with conservative capabilities: no tools, no thinking, no
    /// JSON mode, 8K context.
    pub fn new(name: impl Into<String>, model_pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_pattern: model_pattern.into(),
            supports_tool_calling: false,
            supports_thinking: false,
            preferred_thinking_format: ThinkingFormat::None,
            think_tag_name: None,
            supports_json_mode: false,
            supports_system_prompt: true,
            supports_vision: false,
            context_window: 8_192,
            max_output_tokens: 2_048,
            recommended_temperature: None,
            pricing: None,
        }
    }

    pub fn with_tool_calling(mut self) -> Self {
        self.supports_tool_calling = true;
        self
    }

    pub fn with_think_tags(mut self, tag: impl Into<String>) -> Self {
        self.supports_thinking = true;
        self.preferred_thinking_format = ThinkingFormat::ThinkTags;
        self.think_tag_name = Some(tag.into());
        self
    }

    pub fn with_reasoning_field(mut self) -> Self {
        self.supports_thinking = true;
        self.preferred_thinking_format = ThinkingFormat::ReasoningField;
        self.think_tag_name = None;
        self
    }

    pub fn with_json_mode(mut self) -> Self {
        self.supports_json_mode = true;
        self
    }

    pub fn with_vision(mut self) -> Self {
        self.supports_vision = true;
        self
    }

    pub fn without_system_prompt(mut self) -> Self {
        self.supports_system_prompt = false;
        self
    }

    pub fn with_limits(mut self, context_window: u32, max_output_tokens: u32) -> Self {
        self.context_window = context_window;
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.recommended_temperature = Some(temperature);
        self
    }

    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.preferred_thinking_format == ThinkingFormat::ThinkTags
            && self
                .think_tag_name
                .as_deref()
                .is_none_or(|tag| tag.trim().is_empty())
        {
            return Err(Error::Validation(format!(
                "profile '{}' prefers think tags but sets no think_tag_name",
                self.name
            )));
        }
        Ok(())
    }

    pub fn has(&self, capability: ProfileCapability) -> bool {
        match capability {
            ProfileCapability::ToolCalling => self.supports_tool_calling,
            ProfileCapability::Thinking => self.supports_thinking,
            ProfileCapability::JsonMode => self.supports_json_mode,
            ProfileCapability::SystemPrompt => self.supports_system_prompt,
            ProfileCapability::Vision => self.supports_vision,
            ProfileCapability::ThinkTagName => self
                .think_tag_name
                .as_deref()
                .is_some_and(|tag| !tag.is_empty()),
            ProfileCapability::ContextWindow => self.context_window > 0,
            ProfileCapability::MaxOutputTokens => self.max_output_tokens > 0,
            ProfileCapability::RecommendedTemperature => self.recommended_temperature.is_some(),
            ProfileCapability::Pricing => self.pricing.is_some(),
        }
    }
}

/// Profile attributes that can be queried with
/// [`ModelProfileRegistry::has_capability`](super::ModelProfileRegistry::has_capability).
/// Flags answer as-is; valued attributes answer whether they are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileCapability {
    ToolCalling,
    Thinking,
    JsonMode,
    SystemPrompt,
    Vision,
    ThinkTagName,
    ContextWindow,
    MaxOutputTokens,
    RecommendedTemperature,
    Pricing,
}
