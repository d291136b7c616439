//! # llm-gate
//!
//! Access layer between a game simulation and interchangeable LLM providers.
//!
//! - [`queue::ProviderQueue`] bounds concurrency per provider and retries
//!   rate-limited calls.
//! - [`session::CooldownCalculator`] spreads a provider's request budget over
//!   the game sessions currently talking to it.
//! - [`models::ModelProfileRegistry`] maps model identifiers to static
//!   capability profiles, and [`discovery::ModelCapabilityDiscovery`] probes
//!   the capabilities of models nobody has profiled.
//! - [`prompt_cache::PromptCacheManager`] memoizes world-derived data that
//!   prompt builders read many times per tick.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use llm_gate::{GateSettings, LlmProvider, ProviderQueue};
//! use llm_gate::provider::GenerateRequest;
//!
//! # async fn example(provider: Arc<dyn LlmProvider>) -> llm_gate::Result<()> {
//! let settings = GateSettings::from_env()?;
//! let queue = ProviderQueue::with_config(provider, settings.queue_config())?;
//! let response = queue
//!     .enqueue(GenerateRequest::new("Describe the village."), "session-1")
//!     .await?;
//! println!("{}", response.text);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod discovery;
pub mod models;
pub mod observability;
pub mod prompt_cache;
pub mod provider;
pub mod queue;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use config::{EnvSource, GateSettings};
pub use discovery::{DiscoveredCapabilities, ModelCapabilityDiscovery, ProbeCapability};
pub use models::{ModelProfile, ModelProfileRegistry, ProfileCapability, ThinkingFormat};
pub use observability::{QueueMetrics, QueueMetricsSummary};
pub use prompt_cache::{
    EventBus, LocalEventBus, PromptCacheConfig, PromptCacheManager, PromptCacheStats, WorldQuery,
};
pub use provider::{LlmProvider, ModelPricing, ProviderError, ProviderPricing};
pub use queue::{ProviderQueue, QueueConfig, QueueStats, RateLimitPolicy, Semaphore};
pub use session::{
    CooldownCalculator, CooldownStatus, GameSession, GameSessionManager, RateLimitConfig,
};
pub use store::{FileStore, KeyValueStore, KeyValueStoreExt, MemoryStore, StoreError};

/// Error type for llm-gate operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value handed to a registry or cache was rejected.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The provider adapter returned an error.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Key-value store backend failed.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Provider rejected the credentials (401, 403)
    Authorization,
    /// Configuration or validation errors
    Configuration,
    /// Rate limits and server errors that may succeed on retry
    Transient,
    /// Internal errors (IO, JSON, storage, other provider failures)
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::Validation(_) => ErrorCategory::Configuration,

            Error::Provider(e) if e.is_rate_limit() => ErrorCategory::Transient,
            Error::Provider(ProviderError {
                status: Some(401 | 403),
                ..
            }) => ErrorCategory::Authorization,
            Error::Provider(ProviderError {
                status: Some(500..=599),
                ..
            }) => ErrorCategory::Transient,

            Error::Provider(_) | Error::Store(_) | Error::Json(_) | Error::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Provider(e) => e.status,
            _ => None,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Serialization(e) => Error::Json(e),
            StoreError::Io(e) => Error::Io(e),
            StoreError::InvalidValue { key, message } => {
                Error::Validation(format!("Invalid value for {}: {}", key, message))
            }
            other => Error::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
