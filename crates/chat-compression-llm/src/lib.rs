//! LLM client adapters for the chat context-compression engine

pub mod mock;
pub mod openai;

pub use chat_compression_core::{
    CompletionRequest, FinishReason, LLMConfig, LLMError, LLMProvider, LLMResponse, TokenUsage,
};
pub use mock::{MockCall, MockLLMProvider};
pub use openai::{OpenAICompatibleProvider, parse_completion};
