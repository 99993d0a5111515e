//! Host pipeline hook trait

use async_trait::async_trait;

use crate::payload::{ChatPayload, RequestMetadata};

/// A message-rewriting filter invoked by the host before a request is sent
/// (`inlet`) and after a response completes (`outlet`).
///
/// Filters never fail: anything that goes wrong inside must be handled so
/// the user's chat turn goes through.
#[async_trait]
pub trait MessageFilter: Send + Sync {
    fn name(&self) -> &str;

    /// Lower values run first.
    fn priority(&self) -> i32 {
        0
    }

    async fn inlet(&self, payload: ChatPayload, _metadata: &RequestMetadata) -> ChatPayload {
        payload
    }

    async fn outlet(&self, payload: ChatPayload, _metadata: &RequestMetadata) -> ChatPayload {
        payload
    }
}
