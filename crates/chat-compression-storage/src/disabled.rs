use async_trait::async_trait;
use tracing::debug;

use chat_compression_core::{ConversationSummary, Result, SummaryStore};

/// Stand-in used when the real backend could not be initialised.
///
/// Every lookup misses and every write is dropped, which leaves the engine
/// forwarding full, uncompressed histories.
#[derive(Debug, Clone)]
pub struct DisabledStore {
    reason: String,
}

impl DisabledStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl SummaryStore for DisabledStore {
    async fn load(&self, chat_id: &str) -> Result<Option<ConversationSummary>> {
        debug!(chat_id, "Summary store disabled, nothing to load");
        Ok(None)
    }

    async fn save(&self, chat_id: &str, _summary: &str, _message_count: usize) -> Result<()> {
        debug!(chat_id, "Summary store disabled, dropping summary");
        Ok(())
    }

    async fn delete(&self, _chat_id: &str) -> Result<()> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        Ok(Vec::new())
    }

    fn backend_name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
