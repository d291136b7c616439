//! Session liveness and fair-share scheduling.
//!
//! Callers ask the [`CooldownCalculator`] when they may next call a provider.
//! It divides the provider's budget by the number of live sessions tracked in
//! the [`GameSessionManager`].

pub mod cooldown;
pub mod manager;

pub use cooldown::{CooldownCalculator, CooldownStatus, DEFAULT_RATE_LIMIT, RateLimitConfig};
pub use manager::{DEFAULT_STALE_TIMEOUT, GameSession, GameSessionManager, SessionStats};
