//! Core types and traits for the chat context-compression engine

pub mod error;
pub mod message;
pub mod payload;
pub mod traits;
pub mod types;

pub use error::{CompressionError, Result};
pub use message::{ChatMessage, ContentPart, MessageContent, Role};
pub use payload::{ChatPayload, RequestMetadata};
pub use traits::filter::MessageFilter;
pub use traits::llm::{LLMError, LLMProvider};
pub use traits::store::SummaryStore;
pub use types::{
    CompletionRequest, ConversationSummary, FinishReason, LLMConfig, LLMResponse, StoreStats,
    TokenUsage,
};
