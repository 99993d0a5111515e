use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use chat_compression_core::{
    CompletionRequest, FinishReason, LLMError, LLMProvider, LLMResponse, TokenUsage,
};

/// Mock LLM provider for testing
#[derive(Clone)]
pub struct MockLLMProvider {
    inner: Arc<RwLock<MockLLMProviderInner>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

struct MockLLMProviderInner {
    name: String,
    responses: Vec<String>,
    response_index: usize,
    cycle_responses: bool,
    call_history: Vec<MockCall>,
    should_error: bool,
    error_message: String,
    latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub request: CompletionRequest,
    pub timestamp: std::time::Instant,
}

impl MockLLMProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockLLMProviderInner {
                name: name.into(),
                responses: Vec::new(),
                response_index: 0,
                cycle_responses: false,
                call_history: Vec::new(),
                should_error: false,
                error_message: "Mock error".to_string(),
                latency_ms: 0,
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_response(&mut self, response: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.responses = vec![response.into()];
        inner.response_index = 0;
    }

    pub fn set_responses(&mut self, responses: Vec<String>, cycle: bool) {
        let mut inner = self.inner.write();
        inner.responses = responses;
        inner.response_index = 0;
        inner.cycle_responses = cycle;
    }

    pub fn set_error(&mut self, error_message: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.should_error = true;
        inner.error_message = error_message.into();
    }

    pub fn clear_error(&mut self) {
        self.inner.write().should_error = false;
    }

    pub fn set_latency(&mut self, latency_ms: u64) {
        self.inner.write().latency_ms = latency_ms;
    }

    pub fn call_count(&self) -> usize {
        self.inner.read().call_history.len()
    }

    pub fn call_history(&self) -> Vec<MockCall> {
        self.inner.read().call_history.clone()
    }

    pub fn last_call(&self) -> Option<MockCall> {
        self.inner.read().call_history.last().cloned()
    }

    /// Highest number of `complete` calls that were running at the same time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset(&mut self) {
        let mut inner = self.inner.write();
        inner.responses.clear();
        inner.response_index = 0;
        inner.cycle_responses = false;
        inner.call_history.clear();
        inner.should_error = false;
        inner.error_message = "Mock error".to_string();
        inner.latency_ms = 0;
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    fn next_content(&self) -> String {
        let mut inner = self.inner.write();

        if inner.responses.is_empty() {
            return "Mock response".to_string();
        }

        let content = inner.responses[inner.response_index].clone();
        if inner.cycle_responses {
            inner.response_index = (inner.response_index + 1) % inner.responses.len();
        } else if inner.response_index < inner.responses.len() - 1 {
            inner.response_index += 1;
        }
        content
    }

    fn record_call(&self, request: &CompletionRequest) {
        self.inner.write().call_history.push(MockCall {
            request: request.clone(),
            timestamp: std::time::Instant::now(),
        });
    }

    fn estimate_tokens(request: &CompletionRequest) -> u32 {
        let total_chars: usize = request
            .messages
            .iter()
            .map(|m| m.content.joined_text(" ").len())
            .sum();
        (total_chars / 4) as u32
    }
}

impl Default for MockLLMProvider {
    fn default() -> Self {
        Self::new("default")
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<LLMResponse, LLMError> {
        self.record_call(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let latency_ms = self.inner.read().latency_ms;
        if latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(latency_ms)).await;
        }

        let (should_error, error_message) = {
            let inner = self.inner.read();
            (inner.should_error, inner.error_message.clone())
        };
        if should_error {
            return Err(LLMError::Other(error_message));
        }

        let content = self.next_content();
        let prompt_tokens = Self::estimate_tokens(request);
        let completion_tokens = (content.len() / 4) as u32;

        Ok(LLMResponse::new(content, FinishReason::Stop)
            .with_model(request.model.clone())
            .with_usage(TokenUsage::new(prompt_tokens, completion_tokens)))
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

impl std::fmt::Debug for MockLLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLLMProvider")
            .field("name", &self.inner.read().name)
            .field("calls", &self.call_count())
            .finish()
    }
}
