//! Per-conversation serialization of background runs

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of one async mutex per conversation. Entries exist only while a
/// run holds or waits on them.
#[derive(Debug, Default)]
pub struct ConversationLocks {
    entries: Mutex<HashMap<String, LockEntry>>,
}

#[derive(Debug)]
struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    // Leases holding or waiting, including ones whose wait was cancelled
    // but not yet dropped.
    users: usize,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits (FIFO) until no other run for `chat_id` holds the lease.
    ///
    /// Cancel safe: dropping the future mid-wait unregisters the waiter.
    pub async fn acquire(self: &Arc<Self>, chat_id: &str) -> ConversationLease {
        let lock = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(chat_id.to_string()).or_insert_with(|| LockEntry {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            entry.users += 1;
            Arc::clone(&entry.lock)
        };

        // Built before the wait so a cancelled acquire still releases on drop.
        let mut lease = ConversationLease {
            registry: Arc::clone(self),
            chat_id: chat_id.to_string(),
            guard: None,
        };
        lease.guard = Some(lock.lock_owned().await);
        lease
    }

    /// Conversations with a run holding or waiting on the lock.
    pub fn active(&self) -> usize {
        self.entries.lock().len()
    }

    fn release(&self, chat_id: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(chat_id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                entries.remove(chat_id);
            }
        }
    }
}

/// Exclusive right to summarize one conversation; released on drop.
#[derive(Debug)]
pub struct ConversationLease {
    registry: Arc<ConversationLocks>,
    chat_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ConversationLease {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

impl Drop for ConversationLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.registry.release(&self.chat_id);
    }
}
