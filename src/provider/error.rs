//! Provider error type.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

/// Error code some vendors use instead of HTTP 429.
pub const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";

/// Wait applied when a rate-limit response has no usable `retry-after`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_millis(1000);

/// Error returned by a provider adapter.
///
/// Only `status`, `code` and the `retry-after` header are interpreted by this
/// crate; everything else passes through to the caller untouched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Provider error ({}): {message}", status_label(.status))]
pub struct ProviderError {
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<String>,
    /// Response headers, keyed by lowercase name.
    pub headers: HashMap<String, String>,
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => "no status".into(),
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
            headers: HashMap::new(),
        }
    }

    /// A 429 response carrying `retry-after` in seconds.
    pub fn rate_limited(retry_after_secs: impl Into<String>) -> Self {
        Self::new("Rate limit exceeded")
            .with_status(429)
            .with_header("retry-after", retry_after_secs)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_rate_limit(&self) -> bool {
        self.status == Some(429) || self.code.as_deref() == Some(RATE_LIMIT_CODE)
    }

    /// Parsed `retry-after` header in seconds. `None` if missing, negative,
    /// not a number or too large for a [`Duration`].
    pub fn retry_after(&self) -> Option<Duration> {
        let raw = self.header("retry-after")?.trim();
        let secs: f64 = raw.parse().ok()?;
        Duration::try_from_secs_f64(secs).ok()
    }

    /// Wait implied by this error: `retry-after` when usable, else 1000 ms.
    pub fn retry_after_or_default(&self) -> Duration {
        self.retry_after().unwrap_or(DEFAULT_RETRY_AFTER)
    }
}
