//! Observability for the access layer.
//!
//! Logging goes through `tracing` with structured fields; this module adds
//! the atomic counters each [`ProviderQueue`](crate::queue::ProviderQueue)
//! keeps about its traffic.

mod metrics;

pub use metrics::{Counter, Gauge, Histogram, QueueMetrics, QueueMetricsSummary};
