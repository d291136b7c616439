//! Concurrency-bounded request queue for one provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::config::{MAX_RATE_LIMIT_WAIT, QueueConfig, RateLimitPolicy};
use super::semaphore::{Semaphore, SemaphoreStats};
use crate::Result;
use crate::observability::QueueMetrics;
use crate::provider::{GenerateRequest, GenerateResponse, LlmProvider, ProviderError};

/// Serializes access to one provider adapter.
///
/// At most `max_concurrent` calls are in flight at once. A rate-limit
/// response pauses the whole queue until its `retry-after` window passes,
/// then the throttled request is retried without the caller seeing the error.
#[derive(Debug)]
pub struct ProviderQueue {
    provider: Arc<dyn LlmProvider>,
    provider_id: String,
    semaphore: Semaphore,
    policy: RateLimitPolicy,
    rate_limit_until: Mutex<Option<Instant>>,
    pending: AtomicUsize,
    metrics: QueueMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    pub queue_length: usize,
    pub rate_limited: bool,
    pub rate_limit_wait_ms: u64,
    pub semaphore: SemaphoreStats,
    pub provider_id: String,
}

impl ProviderQueue {
    pub fn new(provider: Arc<dyn LlmProvider>, max_concurrent: usize) -> Result<Self> {
        Self::with_config(provider, QueueConfig::new(max_concurrent))
    }

    pub fn with_config(provider: Arc<dyn LlmProvider>, config: QueueConfig) -> Result<Self> {
        let semaphore = Semaphore::new(config.max_concurrent)?;
        let provider_id = provider.provider_id().to_string();
        tracing::debug!(
            provider_id = %provider_id,
            max_concurrent = config.max_concurrent,
            "provider queue created"
        );
        Ok(Self {
            provider,
            provider_id,
            semaphore,
            policy: config.rate_limit,
            rate_limit_until: Mutex::new(None),
            pending: AtomicUsize::new(0),
            metrics: QueueMetrics::new(),
        })
    }

    /// Sends `request` to the provider once a permit and the rate-limit
    /// window allow it.
    ///
    /// Rate-limit errors are retried after the backoff window. Any other
    /// provider error is returned as-is. The last rate-limit error is
    /// returned only once the policy's retry budget is spent.
    pub async fn enqueue(
        &self,
        request: GenerateRequest,
        session_id: &str,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        let span = tracing::debug_span!(
            "provider_request",
            provider_id = %self.provider_id,
            session_id = %session_id,
            request_id = %Uuid::new_v4(),
        );
        self.run(request).instrument(span).await
    }

    async fn run(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        self.metrics.record_request();
        let mut rate_limited: u32 = 0;

        loop {
            let permit = {
                let _slot = PendingSlot::enter(&self.pending);
                self.wait_out_rate_limit().await;
                self.semaphore.acquire().await
            };

            // Another caller may have been throttled while this one queued.
            // The permit is held so the request keeps its place in line.
            if self.is_rate_limited() {
                let _slot = PendingSlot::enter(&self.pending);
                self.wait_out_rate_limit().await;
            }

            let result = {
                let _call = CallTimer::start(&self.metrics);
                self.provider.generate(&request).await
            };
            drop(permit);

            match result {
                Ok(response) => {
                    self.metrics.record_success(
                        response.input_tokens,
                        response.output_tokens,
                        response.cost_usd,
                    );
                    return Ok(response);
                }
                Err(err) if err.is_rate_limit() => {
                    rate_limited += 1;
                    self.metrics.record_rate_limit();
                    let wait = self.policy.wait_for(&err);
                    self.extend_rate_limit(wait);

                    if self.policy.is_exhausted(rate_limited) {
                        tracing::warn!(
                            attempts = rate_limited,
                            "rate-limit retries exhausted"
                        );
                        self.metrics.record_failure();
                        return Err(err);
                    }

                    tracing::warn!(
                        wait_ms = wait.as_millis() as u64,
                        attempt = rate_limited,
                        "provider rate limited, backing off"
                    );
                    self.metrics.record_retry();
                }
                Err(err) => {
                    tracing::debug!(error = %err, "provider call failed");
                    self.metrics.record_failure();
                    return Err(err);
                }
            }
        }
    }

    async fn wait_out_rate_limit(&self) {
        loop {
            let wait = self.rate_limit_wait_time();
            if wait.is_zero() {
                return;
            }
            tracing::trace!(wait_ms = wait.as_millis() as u64, "waiting out rate limit");
            tokio::time::sleep(wait).await;
        }
    }

    fn until(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.rate_limit_until
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Pushes the shared window out to `now + wait`. Never shortens it.
    fn extend_rate_limit(&self, wait: Duration) -> Instant {
        let now = Instant::now();
        let candidate = now
            .checked_add(wait.min(MAX_RATE_LIMIT_WAIT))
            .unwrap_or(now);
        let mut until = self.until();
        match *until {
            Some(current) if current >= candidate => current,
            _ => {
                *until = Some(candidate);
                candidate
            }
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.until().is_some_and(|until| Instant::now() < until)
    }

    pub fn rate_limit_wait_time(&self) -> Duration {
        self.until()
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    pub fn queue_length(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queue_length: self.queue_length(),
            rate_limited: self.is_rate_limited(),
            rate_limit_wait_ms: self.rate_limit_wait_time().as_millis() as u64,
            semaphore: self.semaphore.stats(),
            provider_id: self.provider_id.clone(),
        }
    }
}

/// Counts a request as queued until it gets a permit or is dropped.
struct PendingSlot<'a>(&'a AtomicUsize);

impl<'a> PendingSlot<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

struct CallTimer<'a> {
    metrics: &'a QueueMetrics,
    started: Instant,
}

impl<'a> CallTimer<'a> {
    fn start(metrics: &'a QueueMetrics) -> Self {
        metrics.record_call_start();
        Self {
            metrics,
            started: Instant::now(),
        }
    }
}

impl Drop for CallTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .record_call_end(self.started.elapsed().as_secs_f64() * 1000.0);
    }
}
