use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::builtin;
use super::profile::{ModelProfile, ProfileCapability};
use crate::{Error, Result};

/// Where a profile sits in match precedence. Lower tiers win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileTier {
    /// Registered at runtime. Newest registration is tried first.
    Custom,
    /// A particular model line, e.g. `qwen3` or `deepseek-r1`.
    Specific,
    /// A vendor-wide fallback, e.g. `qwen`.
    Generic,
}

#[derive(Debug)]
struct ProfileEntry {
    tier: ProfileTier,
    pattern: Regex,
    profile: ModelProfile,
}

impl ProfileEntry {
    fn new(tier: ProfileTier, profile: ModelProfile) -> Result<Self> {
        let pattern = RegexBuilder::new(&profile.model_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                Error::Validation(format!(
                    "profile '{}' has invalid pattern '{}': {}",
                    profile.name, profile.model_pattern, e
                ))
            })?;
        Ok(Self {
            tier,
            pattern,
            profile,
        })
    }
}

/// Resolves model names to capability profiles by first regex match.
#[derive(Debug)]
pub struct ModelProfileRegistry {
    entries: Vec<ProfileEntry>,
    default: ModelProfile,
}

impl ModelProfileRegistry {
    /// Registry with no profiles besides the conservative default.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            default: builtin::default_profile(),
        }
    }

    pub fn builtins() -> Self {
        let mut registry = Self::empty();
        for (tier, profile) in builtin::profiles() {
            match ProfileEntry::new(tier, profile) {
                Ok(entry) => registry.entries.push(entry),
                Err(e) => tracing::warn!(error = %e, "skipping built-in profile"),
            }
        }
        registry
    }

    /// Lowercases and strips any `vendor/` prefix.
    pub fn normalize(model_name: &str) -> String {
        let lower = model_name.trim().to_lowercase();
        match lower.rsplit_once('/') {
            Some((_, name)) => name.to_string(),
            None => lower,
        }
    }

    fn find(&self, model_name: &str) -> Option<&ProfileEntry> {
        let normalized = Self::normalize(model_name);
        self.entries
            .iter()
            .find(|entry| entry.pattern.is_match(&normalized))
    }

    /// Profile for `model_name`, or the default when nothing matches.
    pub fn profile(&self, model_name: &str) -> &ModelProfile {
        match self.find(model_name) {
            Some(entry) => &entry.profile,
            None => {
                tracing::debug!(model = model_name, "no profile matched, using default");
                &self.default
            }
        }
    }

    /// Tier of the matching profile; `None` when the default applies.
    pub fn tier_of(&self, model_name: &str) -> Option<ProfileTier> {
        self.find(model_name).map(|entry| entry.tier)
    }

    /// Adds a custom profile ahead of every other profile. A custom profile
    /// with the same name is replaced.
    pub fn register_profile(&mut self, profile: ModelProfile) -> Result<()> {
        profile.validate()?;
        let entry = ProfileEntry::new(ProfileTier::Custom, profile)?;
        self.entries
            .retain(|e| !(e.tier == ProfileTier::Custom && e.profile.name == entry.profile.name));
        tracing::debug!(
            name = %entry.profile.name,
            pattern = %entry.profile.model_pattern,
            "registered custom profile"
        );
        self.entries.insert(0, entry);
        Ok(())
    }

    pub fn has_capability(&self, model_name: &str, capability: ProfileCapability) -> bool {
        self.profile(model_name).has(capability)
    }

    /// Every profile in match order, default excluded.
    pub fn list_profiles(&self) -> Vec<ModelProfile> {
        self.entries
            .iter()
            .map(|entry| entry.profile.clone())
            .collect()
    }

    pub fn default_profile(&self) -> ModelProfile {
        self.default.clone()
    }

    pub fn set_default_profile(&mut self, profile: ModelProfile) -> Result<()> {
        profile.validate()?;
        self.default = profile;
        Ok(())
    }

    /// Drops custom profiles. Built-ins stay.
    pub fn clear_profiles(&mut self) {
        self.entries.retain(|entry| entry.tier != ProfileTier::Custom);
    }
}

impl Default for ModelProfileRegistry {
    fn default() -> Self {
        Self::builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThinkingFormat;

    #[test]
    fn test_specific_beats_generic() {
        let registry = ModelProfileRegistry::builtins();

        let qwen3 = registry.profile("qwen3-32b");
        assert_eq!(qwen3.name, "qwen3");
        assert_eq!(qwen3.max_output_tokens, 8192);
        assert_eq!(qwen3.think_tag_name.as_deref(), Some("think"));

        let qwen2 = registry.profile("qwen2-7b");
        assert_eq!(qwen2.name, "qwen");
        assert_eq!(qwen2.max_output_tokens, 4096);

        assert_eq!(registry.tier_of("qwen3-32b"), Some(ProfileTier::Specific));
        assert_eq!(registry.tier_of("qwen2-7b"), Some(ProfileTier::Generic));
    }

    #[test]
    fn test_name_normalization() {
        let registry = ModelProfileRegistry::builtins();
        assert_eq!(registry.profile("Qwen/Qwen3-235B").name, "qwen3");
        assert_eq!(registry.profile("openai/gpt-oss-120b").name, "gpt-oss");
        assert_eq!(registry.profile("DeepSeek-R1-Distill-Llama-70B").name, "deepseek-r1");
        assert_eq!(registry.profile("meta-llama-3.1-8b").name, "llama-3");
        assert_eq!(ModelProfileRegistry::normalize(" A/B/Model "), "model");
    }

    #[test]
    fn test_unknown_model_gets_default() {
        let registry = ModelProfileRegistry::builtins();
        let profile = registry.profile("totally-unknown-model");
        assert_eq!(profile.name, "default");
        assert!(!profile.supports_tool_calling);
        assert_eq!(profile.preferred_thinking_format, ThinkingFormat::None);
        assert!(registry.tier_of("totally-unknown-model").is_none());
    }

    #[test]
    fn test_custom_profile_precedence_and_clear() {
        let mut registry = ModelProfileRegistry::builtins();
        let custom = ModelProfile::new("my-qwen", r"^qwen3-32b$").with_limits(16_384, 1_024);
        registry.register_profile(custom).unwrap();

        assert_eq!(registry.profile("qwen3-32b").name, "my-qwen");
        assert_eq!(registry.tier_of("qwen3-32b"), Some(ProfileTier::Custom));
        assert_eq!(registry.profile("qwen3-8b").name, "qwen3");

        let newer = ModelProfile::new("newer", r"^qwen3").with_tool_calling();
        registry.register_profile(newer).unwrap();
        assert_eq!(registry.profile("qwen3-32b").name, "newer");
        assert_eq!(registry.list_profiles()[0].name, "newer");

        registry.clear_profiles();
        assert_eq!(registry.profile("qwen3-32b").name, "qwen3");
        assert!(
            registry
                .list_profiles()
                .iter()
                .all(|p| p.name != "newer" && p.name != "my-qwen")
        );
    }

    #[test]
    fn test_register_rejects_invalid() {
        let mut registry = ModelProfileRegistry::empty();

        let mut missing_tag = ModelProfile::new("bad", "^bad");
        missing_tag.preferred_thinking_format = ThinkingFormat::ThinkTags;
        assert!(matches!(
            registry.register_profile(missing_tag),
            Err(Error::Validation(_))
        ));

        let bad_pattern = ModelProfile::new("bad", "(unclosed");
        assert!(matches!(
            registry.register_profile(bad_pattern),
            Err(Error::Validation(_))
        ));
        assert!(registry.list_profiles().is_empty());
    }

    #[test]
    fn test_has_capability() {
        let registry = ModelProfileRegistry::builtins();
        assert!(registry.has_capability("qwen3-32b", ProfileCapability::Thinking));
        assert!(registry.has_capability("qwen3-32b", ProfileCapability::ThinkTagName));
        assert!(!registry.has_capability("gpt-oss-20b", ProfileCapability::ThinkTagName));
        assert!(!registry.has_capability("gemma-7b", ProfileCapability::SystemPrompt));
        assert!(registry.has_capability("claude-sonnet", ProfileCapability::Pricing));
        assert!(!registry.has_capability("unknown", ProfileCapability::ToolCalling));
    }

    #[test]
    fn test_set_default_profile() {
        let mut registry = ModelProfileRegistry::empty();
        let fallback = ModelProfile::new("fallback", ".*").with_tool_calling();
        registry.set_default_profile(fallback).unwrap();
        assert_eq!(registry.profile("anything").name, "fallback");
        assert!(registry.has_capability("anything", ProfileCapability::ToolCalling));
    }
}
