use super::profile::ModelProfile;
use super::registry::ProfileTier;
use crate::provider::ModelPricing;

/// Built-in profiles in match order. Specific families come before the
/// generic fallback of the same vendor.
pub fn profiles() -> Vec<(ProfileTier, ModelProfile)> {
    vec![
        (ProfileTier::Specific, qwen3()),
        (ProfileTier::Specific, qwq()),
        (ProfileTier::Specific, deepseek_r1()),
        (ProfileTier::Specific, gpt_oss()),
        (ProfileTier::Specific, llama3()),
        (ProfileTier::Specific, mixtral()),
        (ProfileTier::Specific, gemma()),
        (ProfileTier::Specific, claude()),
        (ProfileTier::Specific, gpt_4o()),
        (ProfileTier::Generic, qwen()),
        (ProfileTier::Generic, deepseek()),
        (ProfileTier::Generic, llama()),
        (ProfileTier::Generic, mistral()),
    ]
}

pub fn default_profile() -> ModelProfile {
    ModelProfile::new("default", ".*")
}

fn qwen3() -> ModelProfile {
    ModelProfile::new("qwen3", r"^qwen-?3")
        .with_tool_calling()
        .with_think_tags("think")
        .with_json_mode()
        .with_limits(32_768, 8_192)
        .with_temperature(0.6)
}

fn qwq() -> ModelProfile {
    ModelProfile::new("qwq", r"^qwq")
        .with_tool_calling()
        .with_think_tags("think")
        .with_limits(32_768, 8_192)
        .with_temperature(0.6)
}

fn deepseek_r1() -> ModelProfile {
    ModelProfile::new("deepseek-r1", r"^deepseek-r1")
        .with_think_tags("think")
        .with_limits(65_536, 8_192)
        .with_temperature(0.6)
}

fn gpt_oss() -> ModelProfile {
    ModelProfile::new("gpt-oss", r"^gpt-oss")
        .with_tool_calling()
        .with_reasoning_field()
        .with_json_mode()
        .with_limits(131_072, 16_384)
}

fn llama3() -> ModelProfile {
    ModelProfile::new("llama-3", r"^(meta-)?llama-?3")
        .with_tool_calling()
        .with_json_mode()
        .with_limits(131_072, 8_192)
}

fn mixtral() -> ModelProfile {
    ModelProfile::new("mixtral", r"^mixtral")
        .with_tool_calling()
        .with_json_mode()
        .with_limits(32_768, 4_096)
}

fn gemma() -> ModelProfile {
    ModelProfile::new("gemma", r"^gemma")
        .without_system_prompt()
        .with_limits(8_192, 8_192)
}

fn claude() -> ModelProfile {
    ModelProfile::new("claude", r"^claude")
        .with_tool_calling()
        .with_json_mode()
        .with_vision()
        .with_limits(200_000, 8_192)
        .with_pricing(ModelPricing::new(3.0, 15.0))
}

fn gpt_4o() -> ModelProfile {
    ModelProfile::new("gpt-4o", r"^gpt-4o")
        .with_tool_calling()
        .with_json_mode()
        .with_vision()
        .with_limits(128_000, 16_384)
        .with_pricing(ModelPricing::new(2.5, 10.0))
}

fn qwen() -> ModelProfile {
    ModelProfile::new("qwen", r"^qwen")
        .with_tool_calling()
        .with_json_mode()
        .with_limits(32_768, 4_096)
}

fn deepseek() -> ModelProfile {
    ModelProfile::new("deepseek", r"^deepseek")
        .with_tool_calling()
        .with_json_mode()
        .with_limits(65_536, 8_192)
}

fn llama() -> ModelProfile {
    ModelProfile::new("llama", r"llama").with_limits(8_192, 2_048)
}

fn mistral() -> ModelProfile {
    ModelProfile::new("mistral", r"^(open-)?mistral")
        .with_tool_calling()
        .with_limits(32_768, 4_096)
}
