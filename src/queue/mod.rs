//! Concurrency and rate-limit gate in front of provider adapters.
//!
//! A [`ProviderQueue`] owns one adapter and a FIFO [`Semaphore`]. Every call
//! takes a permit, and a rate-limit response closes the gate for the whole
//! queue until the provider's `retry-after` window has passed.

mod config;
mod provider_queue;
mod semaphore;

pub use config::{DEFAULT_MAX_CONCURRENT, MAX_RATE_LIMIT_WAIT, QueueConfig, RateLimitPolicy};
pub use provider_queue::{ProviderQueue, QueueStats};
pub use semaphore::{Semaphore, SemaphorePermit, SemaphoreStats};
