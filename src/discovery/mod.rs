//! Empirical capability discovery.
//!
//! [`ModelCapabilityDiscovery`] asks a live model a fixed set of probe
//! questions and infers what it can do from the answers. Results are cached
//! in memory per instance and written through to a [`KeyValueStore`], which
//! is the only channel shared between instances.

mod probes;
mod types;

pub use probes::{MAX_STORED_RESPONSE_CHARS, THINK_TAG_VARIANTS, TOOL_CALL_ATTEMPTS};
pub use types::{DiscoveredCapabilities, ProbeCapability, ProbeResult};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::provider::LlmProvider;
use crate::store::{KeyValueStore, KeyValueStoreExt, MemoryStore};

pub const DEFAULT_STORE_PREFIX: &str = "llm_capabilities_";

#[derive(Debug)]
pub struct ModelCapabilityDiscovery {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    cache: DashMap<String, DiscoveredCapabilities>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl ModelCapabilityDiscovery {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            prefix: DEFAULT_STORE_PREFIX.to_string(),
            cache: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Discovery backed by a private in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn store_key(&self, model_id: &str) -> String {
        format!("{}{}", self.prefix, model_id)
    }

    /// Runs the full probe battery. Never fails: probe errors are recorded
    /// in [`DiscoveredCapabilities::probe_results`].
    pub async fn discover_capabilities(
        &self,
        provider: &dyn LlmProvider,
        model_id: &str,
    ) -> DiscoveredCapabilities {
        let caps = probes::run_battery(provider, model_id).await;
        tracing::info!(
            model_id,
            provider_id = provider.provider_id(),
            tool_calling = caps.supports_tool_calling,
            reliability = caps.tool_calling_reliability,
            thinking_format = ?caps.thinking_format,
            json_mode = caps.supports_json_mode,
            failed_probes = caps.failed_probes().count(),
            "capability discovery complete"
        );
        caps
    }

    /// Memory, then store, then a fresh probe run written through to both.
    ///
    /// Concurrent callers for the same model share one probe run.
    pub async fn get_or_discover_capabilities(
        &self,
        provider: &dyn LlmProvider,
        model_id: &str,
    ) -> DiscoveredCapabilities {
        if let Some(caps) = self.cached(model_id) {
            tracing::debug!(model_id, "capabilities served from memory");
            return caps;
        }

        let gate = self
            .in_flight
            .entry(model_id.to_string())
            .or_default()
            .clone();
        let caps = {
            let _guard = gate.lock().await;
            self.resolve(provider, model_id).await
        };
        self.in_flight.remove_if(model_id, |_, entry| {
            Arc::ptr_eq(entry, &gate) && Arc::strong_count(entry) <= 2
        });
        caps
    }

    async fn resolve(&self, provider: &dyn LlmProvider, model_id: &str) -> DiscoveredCapabilities {
        if let Some(caps) = self.cached(model_id) {
            tracing::debug!(model_id, "capabilities resolved by a concurrent caller");
            return caps;
        }

        if let Some(caps) = self.load(model_id).await {
            tracing::debug!(model_id, "capabilities served from store");
            self.cache.insert(model_id.to_string(), caps.clone());
            return caps;
        }

        tracing::debug!(model_id, "capability cache miss");
        let caps = self.discover_capabilities(provider, model_id).await;
        self.cache.insert(model_id.to_string(), caps.clone());
        self.save(model_id, &caps).await;
        caps
    }

    /// In-memory entry only; does not touch the store.
    pub fn cached(&self, model_id: &str) -> Option<DiscoveredCapabilities> {
        self.cache.get(model_id).map(|entry| entry.clone())
    }

    /// Clears one model, or every model under this prefix, from both layers.
    pub async fn clear_cache(&self, model_id: Option<&str>) {
        match model_id {
            Some(model_id) => {
                self.cache.remove(model_id);
                self.delete(&self.store_key(model_id)).await;
            }
            None => {
                self.cache.clear();
                match self.store.list_keys(&self.prefix).await {
                    Ok(keys) => {
                        for key in keys {
                            self.delete(&key).await;
                        }
                    }
                    Err(e) => tracing::warn!(
                        store = self.store.name(),
                        error = %e,
                        "failed to list cached capabilities"
                    ),
                }
            }
        }
    }

    async fn load(&self, model_id: &str) -> Option<DiscoveredCapabilities> {
        let key = self.store_key(model_id);
        match self.store.get::<DiscoveredCapabilities>(&key).await {
            Ok(caps) => caps,
            Err(e) => {
                tracing::warn!(
                    store = self.store.name(),
                    key = %key,
                    error = %e,
                    "failed to read cached capabilities"
                );
                None
            }
        }
    }

    async fn save(&self, model_id: &str, caps: &DiscoveredCapabilities) {
        let key = self.store_key(model_id);
        if let Err(e) = self.store.set(&key, caps).await {
            tracing::warn!(
                store = self.store.name(),
                key = %key,
                error = %e,
                "failed to persist capabilities"
            );
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::warn!(
                store = self.store.name(),
                key = %key,
                error = %e,
                "failed to delete cached capabilities"
            );
        }
    }
}
