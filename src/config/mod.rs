//! Typed settings for the whole access layer.
//!
//! ```rust,no_run
//! use llm_gate::config::GateSettings;
//!
//! # async fn example() -> llm_gate::Result<()> {
//! let settings = GateSettings::load(Some("llm-gate.json".as_ref())).await?;
//! let queue_config = settings.queue_config();
//! # Ok(())
//! # }
//! ```

mod env;

pub use env::{ENV_PREFIX, EnvSource};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::DEFAULT_STORE_PREFIX;
use crate::prompt_cache::PromptCacheConfig;
use crate::queue::{DEFAULT_MAX_CONCURRENT, MAX_RATE_LIMIT_WAIT, QueueConfig, RateLimitPolicy};
use crate::session::{CooldownCalculator, DEFAULT_STALE_TIMEOUT, RateLimitConfig};
use crate::store::{FileStore, KeyValueStore, MemoryStore};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub max_concurrent: usize,
    pub rate_limit: RateLimitPolicy,
    pub session_stale_timeout_secs: u64,
    pub capability_store_prefix: String,
    /// Capability cache file. `None` uses [`FileStore::default_path`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_store_path: Option<PathBuf>,
    /// Keep discovered capabilities in memory only.
    pub ephemeral_capabilities: bool,
    pub prompt_cache: PromptCacheConfig,
    /// Per-provider budgets layered over the built-in table.
    pub provider_rate_limits: HashMap<String, RateLimitConfig>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            rate_limit: RateLimitPolicy::default(),
            session_stale_timeout_secs: DEFAULT_STALE_TIMEOUT.as_secs(),
            capability_store_prefix: DEFAULT_STORE_PREFIX.to_string(),
            capability_store_path: None,
            ephemeral_capabilities: false,
            prompt_cache: PromptCacheConfig::default(),
            provider_rate_limits: HashMap::new(),
        }
    }
}

impl GateSettings {
    /// Defaults overridden by `LLM_GATE_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env(&EnvSource::new())?;
        Ok(settings)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let settings: Self = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded gate settings");
        Ok(settings)
    }

    /// File (if given), then environment overrides, then validation.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path).await?,
            None => Self::default(),
        };
        settings.apply_env(&EnvSource::new())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env(&mut self, env: &EnvSource) -> Result<()> {
        if let Some(v) = env.get("max_concurrent")? {
            self.max_concurrent = v;
        }
        if let Some(v) = env.get("rate_limit.default_wait_ms")? {
            self.rate_limit.default_wait_ms = v;
        }
        if let Some(v) = env.get("rate_limit.max_wait_ms")? {
            self.rate_limit.max_wait_ms = v;
        }
        if let Some(raw) = env.get_raw("rate_limit.max_retries") {
            self.rate_limit.max_retries = match raw.to_ascii_lowercase().as_str() {
                "none" | "unbounded" => None,
                _ => env.get("rate_limit.max_retries")?,
            };
        }
        if let Some(v) = env.get("session_stale_timeout_secs")? {
            self.session_stale_timeout_secs = v;
        }
        if let Some(v) = env.get_raw("capability_store_prefix") {
            self.capability_store_prefix = v;
        }
        if let Some(v) = env.get_raw("capability_store_path") {
            self.capability_store_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env.get("ephemeral_capabilities")? {
            self.ephemeral_capabilities = v;
        }
        if let Some(v) = env.get("sector_size")? {
            self.prompt_cache.sector_size = v;
        }
        if let Some(v) = env.get("harmony_ttl_ticks")? {
            self.prompt_cache.harmony_ttl_ticks = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Config("max_concurrent must be at least 1".into()));
        }
        if self.rate_limit.max_wait_ms == 0 {
            return Err(Error::Config("rate_limit.max_wait_ms must be positive".into()));
        }
        if Duration::from_millis(self.rate_limit.max_wait_ms) > MAX_RATE_LIMIT_WAIT {
            return Err(Error::Config(format!(
                "rate_limit.max_wait_ms ({}) exceeds the {}s ceiling",
                self.rate_limit.max_wait_ms,
                MAX_RATE_LIMIT_WAIT.as_secs()
            )));
        }
        if self.rate_limit.default_wait_ms > self.rate_limit.max_wait_ms {
            return Err(Error::Config(format!(
                "rate_limit.default_wait_ms ({}) exceeds max_wait_ms ({})",
                self.rate_limit.default_wait_ms, self.rate_limit.max_wait_ms
            )));
        }
        if self.session_stale_timeout_secs == 0 {
            return Err(Error::Config(
                "session_stale_timeout_secs must be positive".into(),
            ));
        }
        if self.capability_store_prefix.is_empty() {
            return Err(Error::Config("capability_store_prefix must not be empty".into()));
        }
        for (provider, limit) in &self.provider_rate_limits {
            if limit.requests_per_minute == 0 {
                return Err(Error::Config(format!(
                    "provider_rate_limits.{provider}: requests_per_minute must be positive"
                )));
            }
        }
        self.prompt_cache.validate()
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::new(self.max_concurrent).with_rate_limit(self.rate_limit.clone())
    }

    pub fn session_stale_timeout(&self) -> Duration {
        Duration::from_secs(self.session_stale_timeout_secs)
    }

    /// Store for discovered capabilities, per the path settings.
    pub fn capability_store(&self) -> Arc<dyn KeyValueStore> {
        if self.ephemeral_capabilities {
            return Arc::new(MemoryStore::new());
        }
        match self
            .capability_store_path
            .clone()
            .or_else(FileStore::default_path)
        {
            Some(path) => Arc::new(FileStore::new(path)),
            None => {
                tracing::warn!("no home directory, capability cache is in-memory only");
                Arc::new(MemoryStore::new())
            }
        }
    }

    /// Pushes configured provider budgets into `calculator`.
    pub fn apply_rate_limits(&self, calculator: &CooldownCalculator) {
        for (provider, limit) in &self.provider_rate_limits {
            calculator.set_rate_limit(provider.clone(), *limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::GameSessionManager;

    fn env(vars: &[(&str, &str)]) -> EnvSource {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvSource::from_fn(move |name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = GateSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_concurrent, 4);
        assert_eq!(settings.session_stale_timeout(), Duration::from_secs(60));
        assert_eq!(settings.capability_store_prefix, "llm_capabilities_");
        assert_eq!(settings.prompt_cache.harmony_ttl_ticks, 200);
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = GateSettings::default();
        settings
            .apply_env(&env(&[
                ("LLM_GATE_MAX_CONCURRENT", "2"),
                ("LLM_GATE_RATE_LIMIT_MAX_RETRIES", "unbounded"),
                ("LLM_GATE_RATE_LIMIT_MAX_WAIT_MS", "5000"),
                ("LLM_GATE_SESSION_STALE_TIMEOUT_SECS", "30"),
                ("LLM_GATE_SECTOR_SIZE", "32"),
                ("LLM_GATE_EPHEMERAL_CAPABILITIES", "true"),
            ]))
            .unwrap();

        assert_eq!(settings.max_concurrent, 2);
        assert_eq!(settings.rate_limit.max_retries, None);
        assert_eq!(settings.rate_limit.max_wait_ms, 5000);
        assert_eq!(settings.session_stale_timeout_secs, 30);
        assert_eq!(settings.prompt_cache.sector_size, 32.0);
        assert!(settings.ephemeral_capabilities);
        assert_eq!(settings.queue_config().max_concurrent, 2);

        settings
            .apply_env(&env(&[("LLM_GATE_RATE_LIMIT_MAX_RETRIES", "3")]))
            .unwrap();
        assert_eq!(settings.rate_limit.max_retries, Some(3));
    }

    #[test]
    fn test_env_parse_error() {
        let mut settings = GateSettings::default();
        let err = settings
            .apply_env(&env(&[("LLM_GATE_MAX_CONCURRENT", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation() {
        let zero = GateSettings {
            max_concurrent: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(Error::Config(_))));

        let mut inverted = GateSettings::default();
        inverted.rate_limit.default_wait_ms = 10_000;
        inverted.rate_limit.max_wait_ms = 1_000;
        assert!(inverted.validate().is_err());

        let mut endless = GateSettings::default();
        endless.rate_limit.max_wait_ms = u64::MAX;
        endless.rate_limit.default_wait_ms = u64::MAX;
        assert!(matches!(endless.validate(), Err(Error::Config(_))));

        let mut bad_limit = GateSettings::default();
        bad_limit.provider_rate_limits.insert(
            "groq".into(),
            RateLimitConfig {
                requests_per_minute: 0,
                burst_size: 1,
            },
        );
        assert!(bad_limit.validate().is_err());

        let mut bad_sector = GateSettings::default();
        bad_sector.prompt_cache.sector_size = -1.0;
        assert!(bad_sector.validate().is_err());
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gate.json");
        tokio::fs::write(
            &path,
            r#"{
                "max_concurrent": 8,
                "rate_limit": {"max_retries": 2},
                "provider_rate_limits": {"groq": {"requests_per_minute": 60, "burst_size": 5}}
            }"#,
        )
        .await
        .unwrap();

        let settings = GateSettings::from_file(&path).await.unwrap();
        assert_eq!(settings.max_concurrent, 8);
        assert_eq!(settings.rate_limit.max_retries, Some(2));
        assert_eq!(settings.rate_limit.default_wait_ms, 1000);
        assert!(settings.validate().is_ok());

        let calc = CooldownCalculator::new(Arc::new(GameSessionManager::default()));
        assert_eq!(calc.rate_limit_for("groq", None).requests_per_minute, 30);
        settings.apply_rate_limits(&calc);
        assert_eq!(calc.rate_limit_for("groq", None).requests_per_minute, 60);
    }

    #[tokio::test]
    async fn test_from_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            GateSettings::from_file(dir.path().join("missing.json")).await,
            Err(Error::Io(_))
        ));

        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{").await.unwrap();
        assert!(matches!(
            GateSettings::from_file(&path).await,
            Err(Error::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_capability_store_selection() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = GateSettings {
            capability_store_path: Some(dir.path().join("caps.json")),
            ..Default::default()
        };
        let store = settings.capability_store();
        assert_eq!(store.name(), "file");
        store.set_raw("k", "v").await.unwrap();
        assert!(dir.path().join("caps.json").exists());

        let ephemeral = GateSettings {
            ephemeral_capabilities: true,
            ..Default::default()
        };
        assert_eq!(ephemeral.capability_store().name(), "memory");
    }
}
