//! Scripted provider for unit tests.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    GenerateRequest, GenerateResponse, LlmProvider, ModelPricing, ProviderError, ProviderPricing,
};

type Responder =
    Box<dyn Fn(&GenerateRequest) -> Result<GenerateResponse, ProviderError> + Send + Sync>;

pub(crate) struct MockProvider {
    id: String,
    model: String,
    script: Mutex<VecDeque<Result<GenerateResponse, ProviderError>>>,
    responder: Responder,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Result<GenerateResponse, ProviderError> + Send + Sync + 'static,
    {
        Self {
            id: "mock".into(),
            model: "mock-model".into(),
            script: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::with_responder(move |_| Ok(GenerateResponse::text(text.clone())))
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::with_responder(move |_| Err(error.clone()))
    }

    /// Responses returned in order before falling back to the responder.
    pub fn with_script(
        self,
        script: impl IntoIterator<Item = Result<GenerateResponse, ProviderError>>,
    ) -> Self {
        *self.script.lock().unwrap() = script.into_iter().collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("id", &self.id)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| (self.responder)(request));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn pricing(&self) -> ProviderPricing {
        ProviderPricing::new(&self.id, "Mock", ModelPricing::FREE)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
