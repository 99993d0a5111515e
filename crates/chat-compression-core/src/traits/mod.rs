//! Core traits for the context-compression engine

pub mod filter;
pub mod llm;
pub mod store;

pub use filter::MessageFilter;
pub use llm::LLMProvider;
pub use store::SummaryStore;
