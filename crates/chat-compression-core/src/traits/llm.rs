//! LLM client adapter trait

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CompletionRequest, LLMResponse};

/// Opaque completion capability: a model id, messages and sampling
/// parameters in, generated text out.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<LLMResponse, LLMError>;

    fn provider_name(&self) -> &str;
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::Serialization(err.to_string())
    }
}
