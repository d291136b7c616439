//! Queue sizing and rate-limit retry policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderError;

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Longest rate-limit window a queue will ever open, whatever the policy says.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// How a queue reacts to rate-limit responses.
///
/// The wait comes from the response's `retry-after` header, falling back to
/// `default_wait_ms`, and is capped at `max_wait_ms` (itself clamped to
/// [`MAX_RATE_LIMIT_WAIT`]). A request that keeps
/// getting throttled gives up after `max_retries` backoffs and returns the
/// last rate-limit error; `None` retries forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    pub default_wait_ms: u64,
    pub max_wait_ms: u64,
    pub max_retries: Option<u32>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            default_wait_ms: 1_000,
            max_wait_ms: 60_000,
            max_retries: Some(8),
        }
    }
}

impl RateLimitPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_retries: None,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = u64::try_from(max_wait.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms).min(MAX_RATE_LIMIT_WAIT)
    }

    pub fn wait_for(&self, error: &ProviderError) -> Duration {
        error
            .retry_after()
            .unwrap_or_else(|| self.default_wait())
            .min(self.max_wait())
    }

    pub fn is_exhausted(&self, rate_limited: u32) -> bool {
        self.max_retries.is_some_and(|max| rate_limited > max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    pub rate_limit: RateLimitPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..Default::default()
        }
    }

    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = policy;
        self
    }

    /// One call at a time, short backoff ceiling. Suits free-tier keys.
    pub fn conservative() -> Self {
        Self {
            max_concurrent: 1,
            rate_limit: RateLimitPolicy {
                max_wait_ms: 30_000,
                max_retries: Some(4),
                ..Default::default()
            },
        }
    }

    /// Wide fan-out for self-hosted endpoints that rarely throttle.
    pub fn aggressive() -> Self {
        Self {
            max_concurrent: 16,
            rate_limit: RateLimitPolicy {
                max_retries: Some(16),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.default_wait(), Duration::from_millis(1000));
        assert_eq!(policy.max_retries, Some(8));
    }

    #[test]
    fn test_wait_uses_retry_after() {
        let policy = RateLimitPolicy::default();
        let err = ProviderError::rate_limited("2");
        assert_eq!(policy.wait_for(&err), Duration::from_secs(2));
    }

    #[test]
    fn test_wait_defaults_and_caps() {
        let policy = RateLimitPolicy::default().with_max_wait(Duration::from_secs(5));

        let missing = ProviderError::new("slow").with_status(429);
        assert_eq!(policy.wait_for(&missing), Duration::from_millis(1000));

        let huge = ProviderError::rate_limited("3600");
        assert_eq!(policy.wait_for(&huge), Duration::from_secs(5));
    }

    #[test]
    fn test_wait_never_exceeds_ceiling() {
        let policy = RateLimitPolicy::default().with_max_wait(Duration::MAX);
        assert_eq!(policy.max_wait_ms, u64::MAX);
        assert_eq!(policy.max_wait(), MAX_RATE_LIMIT_WAIT);

        let far = ProviderError::rate_limited("1e15");
        assert_eq!(policy.wait_for(&far), MAX_RATE_LIMIT_WAIT);

        let overflow = ProviderError::rate_limited("1e30");
        assert_eq!(policy.wait_for(&overflow), policy.default_wait());
    }

    #[test]
    fn test_exhaustion() {
        let policy = RateLimitPolicy::default().with_max_retries(2);
        assert!(!policy.is_exhausted(1));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));

        assert!(!RateLimitPolicy::unbounded().is_exhausted(u32::MAX));
    }

    #[test]
    fn test_presets() {
        assert_eq!(QueueConfig::default().max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(QueueConfig::conservative().max_concurrent, 1);
        assert!(QueueConfig::aggressive().max_concurrent > DEFAULT_MAX_CONCURRENT);
    }

    #[test]
    fn test_policy_deserializes_partial() {
        let policy: RateLimitPolicy =
            serde_json::from_str(r#"{"max_retries": null}"#).unwrap();
        assert_eq!(policy.max_retries, None);
        assert_eq!(policy.default_wait_ms, 1000);
    }
}
