//! The context-compression filter exposed to the host pipeline

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::warn;

use chat_compression_core::{
    ChatPayload, LLMProvider, MessageFilter, RequestMetadata, Result, SummaryStore,
};
use chat_compression_storage::create_store_from_env;

use crate::assembler::assemble;
use crate::config::CompressionConfig;
use crate::policy::CompressionPolicy;
use crate::summarizer::{BackgroundSummarizer, SummaryJob, SummaryOutcome};

/// Replaces the middle of long conversations with a stored summary on the
/// way in, and refreshes that summary in the background on the way out.
pub struct ContextCompressionFilter {
    config: Arc<CompressionConfig>,
    policy: CompressionPolicy,
    store: Arc<dyn SummaryStore>,
    summarizer: Arc<BackgroundSummarizer>,
}

impl ContextCompressionFilter {
    pub fn new(
        config: CompressionConfig,
        store: Arc<dyn SummaryStore>,
        llm: Arc<dyn LLMProvider>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let summarizer = Arc::new(BackgroundSummarizer::new(
            Arc::clone(&config),
            Arc::clone(&store),
            llm,
        )?);
        let policy = config.policy()?;

        Ok(Self {
            config,
            policy,
            store,
            summarizer,
        })
    }

    /// Opens the store named by `DATABASE_URL`, or runs without persistence.
    pub async fn from_env(config: CompressionConfig, llm: Arc<dyn LLMProvider>) -> Result<Self> {
        config.validate()?;
        let store = create_store_from_env().await;
        Self::new(config, store, llm)
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SummaryStore> {
        &self.store
    }

    /// Starts a background run when the completed conversation is long
    /// enough. Returns the run's handle, or `None` if nothing was scheduled.
    pub fn schedule_summarization(
        &self,
        payload: &ChatPayload,
        metadata: &RequestMetadata,
    ) -> Option<JoinHandle<SummaryOutcome>> {
        let debug_mode = self.config.debug_mode;
        let Some(chat_id) = metadata.chat_id() else {
            warn!("Request metadata has no chat_id, skipping summarization");
            return None;
        };

        if !self.store.is_enabled() {
            diag!(debug_mode, chat_id, "Summary store disabled, skipping summarization");
            return None;
        }

        let count = payload.messages.len();
        if !self.policy.should_trigger_summarization(count) {
            diag!(
                debug_mode,
                chat_id,
                messages = count,
                threshold = self.policy.threshold(),
                "Below compression threshold"
            );
            return None;
        }

        diag!(debug_mode, chat_id, messages = count, "Scheduling background summarization");
        Some(self.summarizer.spawn(SummaryJob {
            chat_id: chat_id.to_string(),
            messages: payload.messages.clone(),
            conversation_model: payload.model.clone(),
            user_id: metadata.user_id.clone(),
        }))
    }

    async fn load_summary(&self, chat_id: &str) -> Option<String> {
        match self.store.load(chat_id).await {
            Ok(Some(record)) if !record.summary.trim().is_empty() => {
                diag!(
                    self.config.debug_mode,
                    chat_id,
                    covers = record.compressed_message_count,
                    updated_at = %record.updated_at,
                    "Loaded stored summary"
                );
                Some(record.summary)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to load summary, forwarding conversation uncompressed");
                None
            }
        }
    }
}

#[async_trait]
impl MessageFilter for ContextCompressionFilter {
    fn name(&self) -> &str {
        "async_context_compression"
    }

    fn priority(&self) -> i32 {
        self.config.priority
    }

    async fn inlet(&self, mut payload: ChatPayload, metadata: &RequestMetadata) -> ChatPayload {
        let debug_mode = self.config.debug_mode;
        let Some(chat_id) = metadata.chat_id() else {
            warn!("Request metadata has no chat_id, forwarding conversation uncompressed");
            return payload;
        };

        let count = payload.messages.len();
        if count <= self.policy.retained_count() {
            diag!(debug_mode, chat_id, messages = count, "Conversation too short to compress");
            return payload;
        }

        let Some(summary) = self.load_summary(chat_id).await else {
            diag!(debug_mode, chat_id, messages = count, "No summary yet, forwarding conversation uncompressed");
            return payload;
        };

        let compressed = assemble(&payload.messages, &self.policy, Some(&summary));
        diag!(
            debug_mode,
            chat_id,
            original = count,
            compressed = compressed.len(),
            saved = count - compressed.len(),
            keep_first = self.policy.keep_first(),
            keep_last = self.policy.keep_last(),
            "Applied summary to conversation"
        );
        payload.messages = compressed;
        payload
    }

    async fn outlet(&self, payload: ChatPayload, metadata: &RequestMetadata) -> ChatPayload {
        // The handle is dropped; the run outlives this request.
        let _ = self.schedule_summarization(&payload, metadata);
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::summary_block;
    use crate::test_support::{conversation, CountingStore, FailingStore};
    use chat_compression_core::MessageContent;
    use chat_compression_llm::MockLLMProvider;
    use chat_compression_storage::{DisabledStore, InMemorySummaryStore};

    fn filter_with(store: Arc<dyn SummaryStore>, llm: &MockLLMProvider) -> ContextCompressionFilter {
        ContextCompressionFilter::new(CompressionConfig::default(), store, Arc::new(llm.clone()))
            .unwrap()
    }

    fn payload(len: usize) -> ChatPayload {
        ChatPayload::new("chat-model", conversation(len))
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = ContextCompressionFilter::new(
            CompressionConfig::new(7, 1, 6),
            Arc::new(InMemorySummaryStore::new()),
            Arc::new(MockLLMProvider::default()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_name_and_priority() {
        let filter = ContextCompressionFilter::new(
            CompressionConfig::default().with_priority(3),
            Arc::new(InMemorySummaryStore::new()),
            Arc::new(MockLLMProvider::default()),
        )
        .unwrap();
        assert_eq!(filter.name(), "async_context_compression");
        assert_eq!(filter.priority(), 3);
    }

    #[tokio::test]
    async fn test_inlet_without_summary_passes_through() {
        let store = CountingStore::new();
        let filter = filter_with(Arc::new(store.clone()), &MockLLMProvider::default());

        let out = filter.inlet(payload(20), &RequestMetadata::for_chat("chat-1")).await;

        assert_eq!(out, payload(20));
        assert_eq!(store.loads(), 1);
    }

    #[tokio::test]
    async fn test_inlet_short_conversation_skips_lookup() {
        let store = CountingStore::new();
        store.inner.save("chat-1", "S", 20).await.unwrap();
        let filter = filter_with(Arc::new(store.clone()), &MockLLMProvider::default());

        let out = filter.inlet(payload(7), &RequestMetadata::for_chat("chat-1")).await;

        assert_eq!(out, payload(7));
        assert_eq!(store.loads(), 0);
    }

    #[tokio::test]
    async fn test_inlet_compresses_with_summary() {
        let store = InMemorySummaryStore::new();
        store.save("chat-1", "S", 18).await.unwrap();
        let filter = filter_with(Arc::new(store), &MockLLMProvider::default());

        let input = payload(20);
        let out = filter.inlet(input.clone(), &RequestMetadata::for_chat("chat-1")).await;

        assert_eq!(out.model, "chat-model");
        assert_eq!(out.messages.len(), 7);
        assert_eq!(
            out.messages[0].content,
            MessageContent::Text(format!("{}You are helpful.", summary_block("S")))
        );
        assert_eq!(&out.messages[1..], &input.messages[14..]);
    }

    #[tokio::test]
    async fn test_inlet_on_compressed_list_is_stable() {
        let store = InMemorySummaryStore::new();
        store.save("chat-1", "S", 18).await.unwrap();
        let filter = filter_with(Arc::new(store), &MockLLMProvider::default());
        let metadata = RequestMetadata::for_chat("chat-1");

        let once = filter.inlet(payload(20), &metadata).await;
        let twice = filter.inlet(once.clone(), &metadata).await;

        assert_eq!(twice, once);
    }

    #[tokio::test]
    async fn test_inlet_blank_summary_is_absent() {
        let store = InMemorySummaryStore::new();
        store.save("chat-1", "  \n", 18).await.unwrap();
        let filter = filter_with(Arc::new(store), &MockLLMProvider::default());

        let out = filter.inlet(payload(20), &RequestMetadata::for_chat("chat-1")).await;
        assert_eq!(out.messages.len(), 20);
    }

    #[tokio::test]
    async fn test_inlet_store_error_passes_through() {
        let filter = filter_with(Arc::new(FailingStore), &MockLLMProvider::default());

        let out = filter.inlet(payload(20), &RequestMetadata::for_chat("chat-1")).await;
        assert_eq!(out, payload(20));
    }

    #[tokio::test]
    async fn test_missing_chat_id_passes_through() {
        let store = CountingStore::new();
        let llm = MockLLMProvider::default();
        let filter = filter_with(Arc::new(store.clone()), &llm);
        let metadata = RequestMetadata::default();

        assert_eq!(filter.inlet(payload(20), &metadata).await, payload(20));
        assert_eq!(filter.outlet(payload(20), &metadata).await, payload(20));
        assert!(filter.schedule_summarization(&payload(20), &metadata).is_none());
        assert_eq!(store.loads(), 0);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_schedule_respects_threshold() {
        let store = CountingStore::new();
        let filter = filter_with(Arc::new(store.clone()), &MockLLMProvider::default());
        let metadata = RequestMetadata::for_chat("chat-1");

        assert!(filter.schedule_summarization(&payload(14), &metadata).is_none());

        let handle = filter.schedule_summarization(&payload(15), &metadata).unwrap();
        assert!(matches!(handle.await.unwrap(), SummaryOutcome::Summarized { .. }));
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test]
    async fn test_schedule_skipped_when_store_disabled() {
        let llm = MockLLMProvider::default();
        let filter = filter_with(Arc::new(DisabledStore::new("DATABASE_URL is not set")), &llm);

        let handle = filter.schedule_summarization(&payload(20), &RequestMetadata::for_chat("chat-1"));
        assert!(handle.is_none());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_schedule_forwards_user_and_model() {
        let llm = MockLLMProvider::default();
        let filter = filter_with(Arc::new(InMemorySummaryStore::new()), &llm);
        let metadata = RequestMetadata::for_chat("chat-1").with_user("user-7");

        filter
            .schedule_summarization(&payload(20), &metadata)
            .unwrap()
            .await
            .unwrap();

        let call = llm.last_call().unwrap();
        assert_eq!(call.request.model, "chat-model");
        assert_eq!(call.request.user.as_deref(), Some("user-7"));
    }

    #[tokio::test]
    async fn test_outlet_returns_before_summary_is_saved() {
        let mut llm = MockLLMProvider::default();
        llm.set_response("Core topic: later");
        llm.set_latency(200);
        let store = CountingStore::new();
        let filter = filter_with(Arc::new(store.clone()), &llm);

        let started = std::time::Instant::now();
        let out = filter.outlet(payload(20), &RequestMetadata::for_chat("chat-1")).await;
        assert_eq!(out, payload(20));
        assert!(started.elapsed() < std::time::Duration::from_millis(200));
        assert_eq!(store.saves(), 0);
        assert!(store.inner.load("chat-1").await.unwrap().is_none());

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while store.inner.load("chat-1").await.unwrap().is_none() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let saved = store.inner.load("chat-1").await.unwrap().unwrap();
        assert_eq!(store.saves(), 1);
        assert_eq!(saved.summary, "Core topic: later");
        assert_eq!(saved.compressed_message_count, 20);
    }

    #[tokio::test]
    async fn test_outlet_then_inlet_round() {
        let mut llm = MockLLMProvider::default();
        llm.set_response("Core topic: questions and answers");
        let store = InMemorySummaryStore::new();
        let filter = filter_with(Arc::new(store.clone()), &llm);
        let metadata = RequestMetadata::for_chat("chat-1");

        filter
            .schedule_summarization(&payload(20), &metadata)
            .unwrap()
            .await
            .unwrap();

        let out = filter.inlet(payload(22), &metadata).await;
        assert_eq!(out.messages.len(), 7);
        let head = out.messages[0].content.joined_text(" ");
        assert!(head.starts_with("[Conversation summary]\nCore topic: questions and answers"));
        assert!(head.ends_with("You are helpful."));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_round_trip_with_sqlite() {
        use chat_compression_storage::SqliteSummaryStore;

        let mut llm = MockLLMProvider::default();
        llm.set_error("model unavailable");
        let store: Arc<dyn SummaryStore> = Arc::new(SqliteSummaryStore::in_memory().await.unwrap());
        let filter = filter_with(Arc::clone(&store), &llm);
        let metadata = RequestMetadata::for_chat("chat-1");

        filter
            .schedule_summarization(&payload(20), &metadata)
            .unwrap()
            .await
            .unwrap();

        let record = store.load("chat-1").await.unwrap().unwrap();
        assert_eq!(record.compressed_message_count, 20);

        let out = filter.inlet(payload(20), &metadata).await;
        let head = out.messages[0].content.joined_text(" ");
        assert!(head.contains("[History overview] Contains approximately 13 messages."));
    }
}
