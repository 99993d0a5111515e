//! Store doubles and conversation fixtures shared by the engine tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use chat_compression_core::{CompressionError, ConversationSummary, Result, SummaryStore};
use chat_compression_storage::InMemorySummaryStore;

/// In-memory store that counts writes.
#[derive(Clone, Default)]
pub struct CountingStore {
    pub inner: InMemorySummaryStore,
    saves: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryStore for CountingStore {
    async fn load(&self, chat_id: &str) -> Result<Option<ConversationSummary>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(chat_id).await
    }

    async fn save(&self, chat_id: &str, summary: &str, message_count: usize) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(chat_id, summary, message_count).await
    }

    async fn delete(&self, chat_id: &str) -> Result<()> {
        self.inner.delete(chat_id).await
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        self.inner.list().await
    }

    fn backend_name(&self) -> &str {
        "counting"
    }
}

/// Store whose every call fails, as a live but broken database would.
pub struct FailingStore;

#[async_trait]
impl SummaryStore for FailingStore {
    async fn load(&self, _chat_id: &str) -> Result<Option<ConversationSummary>> {
        Err(CompressionError::Persistence("connection refused".to_string()))
    }

    async fn save(&self, _chat_id: &str, _summary: &str, _message_count: usize) -> Result<()> {
        Err(CompressionError::Persistence("connection refused".to_string()))
    }

    async fn delete(&self, _chat_id: &str) -> Result<()> {
        Err(CompressionError::Persistence("connection refused".to_string()))
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        Err(CompressionError::Persistence("connection refused".to_string()))
    }

    fn backend_name(&self) -> &str {
        "failing"
    }
}

/// `len` alternating user/assistant messages after a leading system prompt.
pub fn conversation(len: usize) -> Vec<chat_compression_core::ChatMessage> {
    use chat_compression_core::ChatMessage;

    (0..len)
        .map(|i| {
            if i == 0 {
                ChatMessage::system("You are helpful.")
            } else if i % 2 == 1 {
                ChatMessage::user(format!("question {}", i))
            } else {
                ChatMessage::assistant(format!("answer {}", i))
            }
        })
        .collect()
}
