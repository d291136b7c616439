//! Gate Scenario Tests
//!
//! End-to-end flows through the public API: many game sessions sharing one
//! provider, capability discovery against a scripted model, and the prompt
//! cache driven by a small in-memory world.
//!
//! Run: cargo nextest run --test gate_scenarios

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use llm_gate::provider::{GenerateRequest, GenerateResponse};
use llm_gate::{LlmProvider, ModelPricing, ProviderError, ProviderPricing};

type Reply = Result<GenerateResponse, ProviderError>;

/// Routes crate logs to the test harness. Filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Provider that answers from a script, then from a fallback responder.
#[derive(Default)]
struct ScriptedModel {
    script: Mutex<VecDeque<Reply>>,
    responder: Option<Box<dyn Fn(&str) -> Reply + Send + Sync>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl std::fmt::Debug for ScriptedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedModel")
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl ScriptedModel {
    fn answering(responder: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Default::default()
        }
    }

    fn with_script(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        *self.script.lock().unwrap() = replies.into_iter().collect();
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    async fn generate(&self, request: &GenerateRequest) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.responder {
            Some(responder) => responder(&request.prompt),
            None => Ok(GenerateResponse::text("ok")),
        }
    }

    fn model_name(&self) -> &str {
        "scripted-7b"
    }

    fn pricing(&self) -> ProviderPricing {
        ProviderPricing::new("local", "Local", ModelPricing::FREE)
    }

    fn provider_id(&self) -> &str {
        "local"
    }
}

// =============================================================================
// Shared provider access
// =============================================================================

mod shared_access_tests {
    use super::*;
    use llm_gate::{CooldownCalculator, GameSessionManager, ProviderQueue, RateLimitConfig};

    #[tokio::test(start_paused = true)]
    async fn test_sessions_share_one_bounded_queue() {
        init_tracing();
        let model = Arc::new(
            ScriptedModel::answering(|prompt| Ok(GenerateResponse::text(prompt.to_uppercase())))
                .with_delay(Duration::from_millis(200)),
        );
        let queue = Arc::new(ProviderQueue::new(model.clone(), 2).unwrap());

        let mut handles = Vec::new();
        for i in 0..6 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(GenerateRequest::new(format!("hello {i}")), &format!("s{i}"))
                    .await
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.text, format!("HELLO {i}"));
        }

        assert_eq!(model.calls(), 6);
        assert_eq!(model.peak_in_flight(), 2);
        let summary = queue.metrics().summary();
        assert_eq!(summary.total_requests, 6);
        assert_eq!(summary.successful_requests, 6);
        assert_eq!(summary.in_flight, 0);
        assert_eq!(queue.queue_length(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_absorbed_by_queue() {
        init_tracing();
        let model = Arc::new(
            ScriptedModel::default().with_script([
                Err(ProviderError::rate_limited("3")),
                Ok(GenerateResponse::text("after backoff")),
            ]),
        );
        let queue = ProviderQueue::new(model.clone(), 1).unwrap();

        let started = tokio::time::Instant::now();
        let response = queue
            .enqueue(GenerateRequest::new("build a farm"), "s1")
            .await
            .unwrap();

        assert_eq!(response.text, "after backoff");
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(model.calls(), 2);
        let summary = queue.metrics().summary();
        assert_eq!(summary.rate_limit_hits, 1);
        assert_eq!(summary.retries, 1);
        assert!(!queue.is_rate_limited());
    }

    #[tokio::test]
    async fn test_non_rate_limit_errors_surface() {
        let model = Arc::new(ScriptedModel::answering(|_| {
            Err(ProviderError::new("context length exceeded").with_status(400))
        }));
        let queue = ProviderQueue::new(model.clone(), 1).unwrap();

        let err = queue
            .enqueue(GenerateRequest::new("x"), "s1")
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(400));
        assert_eq!(model.calls(), 1);

        let err: llm_gate::Error = err.into();
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_tracks_active_sessions() {
        let sessions = Arc::new(GameSessionManager::new(Duration::from_secs(60)));
        let cooldown = CooldownCalculator::new(Arc::clone(&sessions))
            .with_rate_limit("local", RateLimitConfig::new(60, 5).unwrap());

        for id in ["farm", "mine", "mill"] {
            sessions.register_session(id);
        }
        assert_eq!(
            cooldown.calculate_cooldown("local", None),
            Duration::from_secs(3)
        );

        sessions.record_request("farm");
        assert!(!cooldown.can_request_now("farm", "local", None));
        assert!(cooldown.can_request_now("mine", "local", None));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(cooldown.can_request_now("farm", "local", None));

        // Two sessions go quiet; the survivor's budget widens.
        tokio::time::advance(Duration::from_secs(58)).await;
        sessions.heartbeat("farm");
        assert_eq!(sessions.active_session_count(), 1);
        assert_eq!(
            cooldown.calculate_cooldown("local", None),
            Duration::from_secs(1)
        );
        assert_eq!(sessions.prune_stale(), 2);
    }
}

// =============================================================================
// Capability discovery
// =============================================================================

mod discovery_tests {
    use super::*;
    use llm_gate::{
        KeyValueStore, KeyValueStoreExt, MemoryStore, ModelCapabilityDiscovery,
        ModelProfileRegistry, ThinkingFormat,
    };

    fn qwen_like() -> ScriptedModel {
        ScriptedModel::answering(|prompt| {
            let text = if prompt.contains("calculator") {
                r#"{"tool": "calculator", "arguments": {"expression": "1847 * 29"}}"#.to_string()
            } else if prompt.contains("<think>") {
                "<think>Canberra, not Sydney.</think> Canberra".to_string()
            } else if prompt.contains("population") {
                "```json\n{\"name\": \"Oakvale\", \"population\": 120}\n```".to_string()
            } else {
                "Both weigh the same.".to_string()
            };
            Ok(GenerateResponse::text(text))
        })
    }

    #[tokio::test]
    async fn test_discovery_persists_through_store() {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let model = qwen_like();

        let discovery = ModelCapabilityDiscovery::new(store.clone());
        let caps = discovery
            .get_or_discover_capabilities(&model, "qwen-custom")
            .await;

        assert!(caps.supports_tool_calling);
        assert_eq!(caps.tool_calling_reliability, 1.0);
        assert_eq!(caps.thinking_format, ThinkingFormat::ThinkTags);
        assert_eq!(caps.thinking_tag_name.as_deref(), Some("think"));
        assert!(caps.supports_json_mode);
        assert_eq!(caps.provider_id, "local");

        let keys = store.list_keys("llm_capabilities_").await.unwrap();
        assert_eq!(keys, vec!["llm_capabilities_qwen-custom".to_string()]);

        // A second process reads the stored result without probing.
        let probes_so_far = model.calls();
        let restarted = ModelCapabilityDiscovery::new(store.clone());
        let again = restarted
            .get_or_discover_capabilities(&model, "qwen-custom")
            .await;
        assert_eq!(model.calls(), probes_so_far);
        assert_eq!(again.thinking_tag_name, caps.thinking_tag_name);

        let stored: llm_gate::DiscoveredCapabilities = store
            .get("llm_capabilities_qwen-custom")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.model_id, "qwen-custom");
    }

    #[tokio::test]
    async fn test_discovery_survives_dead_provider() {
        let model =
            ScriptedModel::answering(|_| Err(ProviderError::new("connection refused")));
        let discovery = ModelCapabilityDiscovery::in_memory();

        let caps = discovery
            .get_or_discover_capabilities(&model, "ghost")
            .await;

        assert!(!caps.supports_tool_calling);
        assert_eq!(caps.thinking_format, ThinkingFormat::None);
        assert!(!caps.supports_json_mode);
        assert!(caps.probe_results.iter().all(|r| !r.success && r.error.is_some()));
    }

    #[tokio::test]
    async fn test_discovered_caps_refine_static_profile() {
        let registry = ModelProfileRegistry::default();
        let profile = registry.profile("acme/unknown-model-9b");
        assert_eq!(profile.name, "default");
        assert!(!profile.supports_tool_calling);

        let discovery = ModelCapabilityDiscovery::in_memory();
        let caps = discovery
            .get_or_discover_capabilities(&qwen_like(), "unknown-model-9b")
            .await;
        let refined = caps.overlay(profile);

        assert!(refined.supports_tool_calling);
        assert_eq!(refined.preferred_thinking_format, ThinkingFormat::ThinkTags);
        assert_eq!(refined.think_tag_name.as_deref(), Some("think"));
        assert_eq!(refined.context_window, profile.context_window);
    }
}

// =============================================================================
// Prompt cache
// =============================================================================

mod prompt_cache_tests {
    use super::*;
    use llm_gate::prompt_cache::{
        AGENT, AerialHarmony, BUILDING, BUILDING_COMPLETE, EntitySnapshot, STORAGE,
    };
    use llm_gate::{LocalEventBus, PromptCacheManager, WorldQuery};
    use serde_json::json;

    #[derive(Default)]
    struct Village {
        entities: Mutex<Vec<EntitySnapshot>>,
        queries: AtomicUsize,
    }

    impl Village {
        fn add(&self, entity: EntitySnapshot) {
            self.entities.lock().unwrap().push(entity);
        }
    }

    impl WorldQuery for Village {
        fn entities_with(&self, tags: &[&str]) -> Vec<EntitySnapshot> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.entities
                .lock()
                .unwrap()
                .iter()
                .filter(|e| tags.iter().all(|t| e.has(t)))
                .cloned()
                .collect()
        }
    }

    fn seeded_village() -> Arc<Village> {
        let village = Arc::new(Village::default());
        village.add(
            EntitySnapshot::new(1)
                .with_component(BUILDING, json!({"type": "granary"}))
                .with_component(STORAGE, json!({"items": {"wheat": 40, "wood": 5}})),
        );
        village.add(EntitySnapshot::new(2).with_component(BUILDING, json!({"type": "house"})));
        village.add(
            EntitySnapshot::new(3)
                .with_component(AGENT, json!({"behavior": "farming", "skills": {"farming": 2}})),
        );
        village
    }

    #[test]
    fn test_village_aggregates_follow_building_events() {
        init_tracing();
        let village = seeded_village();
        let bus = LocalEventBus::new();
        let cache = PromptCacheManager::new(village.clone());
        cache.initialize(&bus);

        cache.start_frame(1);
        assert_eq!(cache.building_counts().get("house"), Some(&1));
        assert_eq!(cache.storage_totals().get("wheat"), Some(&40));
        assert_eq!(cache.agent_counts_by_skill().get("farming"), Some(&1));

        // New building: aggregates stay until the event fires.
        village.add(EntitySnapshot::new(4).with_component(BUILDING, json!({"type": "house"})));
        cache.start_frame(2);
        assert_eq!(cache.building_counts().get("house"), Some(&1));

        bus.emit(BUILDING_COMPLETE, &json!({"entity": 4}));
        assert_eq!(cache.building_counts().get("house"), Some(&2));

        cache.dispose();
        assert_eq!(bus.handler_count(BUILDING_COMPLETE), 0);
    }

    #[test]
    fn test_frame_queries_hit_world_once_per_tick() {
        let village = seeded_village();
        let cache = PromptCacheManager::new(village.clone());

        cache.start_frame(10);
        for _ in 0..5 {
            assert_eq!(cache.all_buildings().len(), 2);
            assert_eq!(cache.buildings_by_type("granary").len(), 1);
        }
        assert_eq!(village.queries.load(Ordering::SeqCst), 1);

        cache.start_frame(11);
        cache.all_buildings();
        assert_eq!(village.queries.load(Ordering::SeqCst), 2);
        assert!(cache.stats().hit_rate() > 0.5);
    }

    #[test]
    fn test_aerial_harmony_expires_and_invalidates() {
        let cache = PromptCacheManager::new(seeded_village());
        let analysis = AerialHarmony {
            score: 0.8,
            summary: "tidy fields".into(),
        };

        cache.set_aerial_harmony(20.0, 20.0, analysis.clone(), 100);
        assert_eq!(cache.aerial_harmony(30.0, 17.0, 150), Some(analysis.clone()));
        assert_eq!(cache.aerial_harmony(20.0, 20.0, 301), None);

        cache.set_aerial_harmony(20.0, 20.0, analysis, 400);
        assert_eq!(cache.invalidate_aerial_harmony_at(0.0, 0.0, 4.0), 0);
        assert_eq!(cache.invalidate_aerial_harmony_at(0.0, 0.0, 16.0), 1);
        assert_eq!(cache.aerial_harmony(20.0, 20.0, 400), None);
    }
}
