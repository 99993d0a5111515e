//! Priority-ordered composition of message filters

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use chat_compression_core::{ChatPayload, MessageFilter, RequestMetadata};

/// Runs several filters in ascending priority order, each seeing the
/// previous one's output.
pub struct FilterChain {
    filters: Vec<Arc<dyn MessageFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn add(mut self, filter: Arc<dyn MessageFilter>) -> Self {
        self.filters.push(filter);
        // Stable, so equal priorities keep insertion order.
        self.filters.sort_by_key(|f| f.priority());
        self
    }

    pub fn with_filters(filters: Vec<Arc<dyn MessageFilter>>) -> Self {
        filters.into_iter().fold(Self::new(), Self::add)
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageFilter for FilterChain {
    fn name(&self) -> &str {
        "filter_chain"
    }

    async fn inlet(&self, mut payload: ChatPayload, metadata: &RequestMetadata) -> ChatPayload {
        for filter in &self.filters {
            debug!(filter = filter.name(), "Running inlet");
            payload = filter.inlet(payload, metadata).await;
        }
        payload
    }

    async fn outlet(&self, mut payload: ChatPayload, metadata: &RequestMetadata) -> ChatPayload {
        for filter in &self.filters {
            debug!(filter = filter.name(), "Running outlet");
            payload = filter.outlet(payload, metadata).await;
        }
        payload
    }
}
