//! In-process metrics for provider queues.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe atomic gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Simple histogram using fixed buckets.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    bucket_bounds: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bucket_bounds: Vec<f64>) -> Self {
        let buckets = (0..=bucket_bounds.len())
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            buckets,
            bucket_bounds,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Buckets sized for LLM round trips, which routinely take seconds.
    pub fn default_latency() -> Self {
        Self::new(vec![
            50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0,
        ])
    }

    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .bucket_bounds
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.bucket_bounds.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        // Stored scaled by 1000 to keep sub-millisecond precision.
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum_ms(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum_ms() / count as f64
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::default_latency()
    }
}

/// Counters kept by each provider queue.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub requests_total: Counter,
    pub requests_success: Counter,
    pub requests_error: Counter,
    pub rate_limit_hits: Counter,
    pub retries: Counter,
    pub tokens_input: Counter,
    pub tokens_output: Counter,
    pub cost_total_micros: Counter,
    pub in_flight: Gauge,
    pub call_latency_ms: Histogram,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.inc();
    }

    pub fn record_call_start(&self) {
        self.in_flight.inc();
    }

    pub fn record_call_end(&self, latency_ms: f64) {
        self.in_flight.dec();
        self.call_latency_ms.observe(latency_ms);
    }

    pub fn record_success(&self, input_tokens: u64, output_tokens: u64, cost_usd: f64) {
        self.requests_success.inc();
        self.tokens_input.add(input_tokens);
        self.tokens_output.add(output_tokens);
        self.cost_total_micros
            .add((cost_usd.max(0.0) * 1_000_000.0) as u64);
    }

    pub fn record_failure(&self) {
        self.requests_error.inc();
    }

    pub fn record_rate_limit(&self) {
        self.rate_limit_hits.inc();
    }

    pub fn record_retry(&self) {
        self.retries.inc();
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.cost_total_micros.get() as f64 / 1_000_000.0
    }

    pub fn summary(&self) -> QueueMetricsSummary {
        QueueMetricsSummary::from_metrics(self)
    }
}

/// Point-in-time snapshot of [`QueueMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueMetricsSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limit_hits: u64,
    pub retries: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
    pub in_flight: i64,
    pub avg_latency_ms: f64,
}

impl QueueMetricsSummary {
    pub fn from_metrics(metrics: &QueueMetrics) -> Self {
        Self {
            total_requests: metrics.requests_total.get(),
            successful_requests: metrics.requests_success.get(),
            failed_requests: metrics.requests_error.get(),
            rate_limit_hits: metrics.rate_limit_hits.get(),
            retries: metrics.retries.get(),
            total_input_tokens: metrics.tokens_input.get(),
            total_output_tokens: metrics.tokens_output.get(),
            total_cost_usd: metrics.total_cost_usd(),
            in_flight: metrics.in_flight.get(),
            avg_latency_ms: metrics.call_latency_ms.mean(),
        }
    }
}
