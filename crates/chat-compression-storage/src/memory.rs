use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use chat_compression_core::{ConversationSummary, Result, SummaryStore};

use crate::clock::MonotonicClock;

/// Process-local store. Used in tests and by embedders that do not need
/// summaries to survive a restart.
#[derive(Clone)]
pub struct InMemorySummaryStore {
    records: Arc<RwLock<HashMap<String, ConversationSummary>>>,
    next_id: Arc<RwLock<i64>>,
    clock: Arc<MonotonicClock>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(RwLock::new(1)),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for InMemorySummaryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn load(&self, chat_id: &str) -> Result<Option<ConversationSummary>> {
        Ok(self.records.read().get(chat_id).cloned())
    }

    async fn save(&self, chat_id: &str, summary: &str, message_count: usize) -> Result<()> {
        let now = self.clock.now();
        let mut records = self.records.write();

        match records.get_mut(chat_id) {
            Some(existing) => {
                existing.summary = summary.to_string();
                existing.compressed_message_count = message_count as i64;
                existing.updated_at = now;
            }
            None => {
                let id = {
                    let mut next = self.next_id.write();
                    let id = *next;
                    *next += 1;
                    id
                };
                records.insert(
                    chat_id.to_string(),
                    ConversationSummary {
                        id: Some(id),
                        chat_id: chat_id.to_string(),
                        summary: summary.to_string(),
                        compressed_message_count: message_count as i64,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, chat_id: &str) -> Result<()> {
        self.records.write().remove(chat_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        let mut all: Vec<_> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_load_missing() {
        let store = InMemorySummaryStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = InMemorySummaryStore::new();

        store.save("chat-1", "first", 15).await.unwrap();
        let first = store.load("chat-1").await.unwrap().unwrap();

        store.save("chat-1", "second", 17).await.unwrap();
        let second = store.load("chat-1").await.unwrap().unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(second.summary, "second");
        assert_eq!(second.compressed_message_count, 17);
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_list_newest_first_and_delete() {
        let store = InMemorySummaryStore::new();
        store.save("a", "sa", 15).await.unwrap();
        store.save("b", "sb", 16).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].chat_id, "b");
        assert_eq!(listed[1].chat_id, "a");

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expire_and_stats_defaults() {
        let store = InMemorySummaryStore::new();
        store.save("a", "1234", 20).await.unwrap();
        store.save("b", "12", 30).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_summaries, 2);
        assert_eq!(stats.total_compressed_messages, 50);

        let removed = store
            .expire_before(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.is_empty());
    }
}
