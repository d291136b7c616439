//! Fair-share request spacing across sessions.
//!
//! A provider's per-minute budget is split evenly between the sessions that
//! are currently live, so each session's minimum gap between requests grows
//! with the number of competitors.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::manager::GameSessionManager;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

impl RateLimitConfig {
    pub fn new(requests_per_minute: u32, burst_size: u32) -> Result<Self> {
        if requests_per_minute == 0 {
            return Err(Error::Config(
                "requests_per_minute must be greater than zero".into(),
            ));
        }
        Ok(Self {
            requests_per_minute,
            burst_size,
        })
    }

    const fn builtin(requests_per_minute: u32, burst_size: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size,
        }
    }

    /// Spacing between requests when one caller has the whole budget.
    pub fn base_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.requests_per_minute.max(1) as f64)
    }
}

pub const DEFAULT_RATE_LIMIT: RateLimitConfig = RateLimitConfig::builtin(60, 5);

const BUILTIN_RATE_LIMITS: &[(&str, RateLimitConfig)] = &[
    ("groq", RateLimitConfig::builtin(30, 5)),
    ("cerebras", RateLimitConfig::builtin(30, 5)),
    ("openrouter", RateLimitConfig::builtin(20, 3)),
    ("openai", RateLimitConfig::builtin(500, 50)),
    ("anthropic", RateLimitConfig::builtin(50, 10)),
    ("ollama", RateLimitConfig::builtin(1000, 100)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStatus {
    pub can_request: bool,
    pub wait: Duration,
    pub next_allowed_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CooldownCalculator {
    sessions: Arc<GameSessionManager>,
    limits: DashMap<String, RateLimitConfig>,
    custom: DashMap<String, RateLimitConfig>,
    fallback: RateLimitConfig,
}

impl CooldownCalculator {
    /// Calculator seeded with the built-in per-provider limits.
    pub fn new(sessions: Arc<GameSessionManager>) -> Self {
        let limits = BUILTIN_RATE_LIMITS
            .iter()
            .map(|(id, config)| (id.to_string(), *config))
            .collect();
        Self {
            sessions,
            limits,
            custom: DashMap::new(),
            fallback: DEFAULT_RATE_LIMIT,
        }
    }

    pub fn with_rate_limit(self, provider_id: impl Into<String>, config: RateLimitConfig) -> Self {
        self.limits.insert(provider_id.into(), config);
        self
    }

    pub fn with_fallback(mut self, config: RateLimitConfig) -> Self {
        self.fallback = config;
        self
    }

    pub fn sessions(&self) -> &Arc<GameSessionManager> {
        &self.sessions
    }

    pub fn set_rate_limit(&self, provider_id: impl Into<String>, config: RateLimitConfig) {
        self.limits.insert(provider_id.into(), config);
    }

    /// Overrides the provider limit for requests made with one API key.
    pub fn set_custom_rate_limit(&self, api_key_hash: impl Into<String>, config: RateLimitConfig) {
        self.custom.insert(api_key_hash.into(), config);
    }

    pub fn remove_custom_rate_limit(&self, api_key_hash: &str) -> Option<RateLimitConfig> {
        self.custom.remove(api_key_hash).map(|(_, config)| config)
    }

    pub fn rate_limit_for(&self, provider_id: &str, api_key_hash: Option<&str>) -> RateLimitConfig {
        if let Some(hash) = api_key_hash
            && let Some(config) = self.custom.get(hash)
        {
            return *config;
        }
        self.limits
            .get(provider_id)
            .map(|config| *config)
            .unwrap_or(self.fallback)
    }

    /// Minimum gap each session must leave between requests right now.
    pub fn calculate_cooldown(&self, provider_id: &str, api_key_hash: Option<&str>) -> Duration {
        let active = self.sessions.active_session_count();
        if active == 0 {
            return Duration::ZERO;
        }
        let base = self.rate_limit_for(provider_id, api_key_hash).base_interval();
        base * u32::try_from(active).unwrap_or(u32::MAX)
    }

    /// `None` until the session has made a request.
    pub fn calculate_next_allowed_time(
        &self,
        session_id: &str,
        provider_id: &str,
        api_key_hash: Option<&str>,
    ) -> Option<Instant> {
        let last = self.sessions.session(session_id)?.last_request_time?;
        Some(last + self.calculate_cooldown(provider_id, api_key_hash))
    }

    pub fn can_request_now(
        &self,
        session_id: &str,
        provider_id: &str,
        api_key_hash: Option<&str>,
    ) -> bool {
        self.calculate_next_allowed_time(session_id, provider_id, api_key_hash)
            .is_none_or(|next| Instant::now() >= next)
    }

    pub fn cooldown_status(
        &self,
        session_id: &str,
        provider_id: &str,
        api_key_hash: Option<&str>,
    ) -> CooldownStatus {
        let next_allowed_at =
            self.calculate_next_allowed_time(session_id, provider_id, api_key_hash);
        let wait = next_allowed_at
            .map(|next| next.saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        CooldownStatus {
            can_request: wait.is_zero(),
            wait,
            next_allowed_at,
        }
    }
}
