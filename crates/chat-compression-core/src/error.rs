//! Error types shared across the workspace

use thiserror::Error;

use crate::traits::llm::LLMError;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LLMError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CompressionError>;
