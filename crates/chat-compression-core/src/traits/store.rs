//! Summary store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{ConversationSummary, StoreStats};

/// Persistent mapping from conversation id to its latest summary.
///
/// Built-in backends: `SqliteSummaryStore`, `PostgresSummaryStore`,
/// `InMemorySummaryStore` and `DisabledStore`.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Point lookup. Returns `None` if the conversation has no summary yet.
    async fn load(&self, chat_id: &str) -> Result<Option<ConversationSummary>>;

    /// Upsert keyed by `chat_id`. Creates the record or overwrites `summary`,
    /// `compressed_message_count` and `updated_at`.
    async fn save(&self, chat_id: &str, summary: &str, message_count: usize) -> Result<()>;

    /// Remove a conversation's summary. Missing records are not an error.
    async fn delete(&self, chat_id: &str) -> Result<()>;

    /// All records, most recently updated first.
    async fn list(&self) -> Result<Vec<ConversationSummary>>;

    fn backend_name(&self) -> &str;

    /// False only for the store used when persistence could not be set up.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Delete every record last updated before `before`, returning the count.
    async fn expire_before(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for record in self.list().await? {
            if record.updated_at < before {
                self.delete(&record.chat_id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats::from_summaries(&self.list().await?))
    }
}
