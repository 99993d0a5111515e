//! Asynchronous context compression for long chat histories.
//!
//! The [`ContextCompressionFilter`] sits in a host's request pipeline. On the
//! way in it swaps the middle of a long conversation for a stored summary; on
//! the way out it kicks off a background run that refreshes that summary.

/// Per-request diagnostics: `info` when `debug_mode` is on, `debug` otherwise.
macro_rules! diag {
    ($debug_mode:expr, $($arg:tt)+) => {
        if $debug_mode {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

pub mod assembler;
pub mod chain;
pub mod config;
pub mod filter;
pub mod formatter;
pub mod locks;
pub mod policy;
pub mod prompt;
pub mod summarizer;

#[cfg(test)]
mod test_support;

pub use assembler::{assemble, compress, inject_summary, summary_block};
pub use chain::FilterChain;
pub use chat_compression_core::{
    ChatMessage, ChatPayload, CompressionError, MessageFilter, RequestMetadata, Result,
};
pub use config::CompressionConfig;
pub use filter::ContextCompressionFilter;
pub use formatter::format_transcript;
pub use locks::{ConversationLease, ConversationLocks};
pub use policy::CompressionPolicy;
pub use summarizer::{BackgroundSummarizer, SummarizerState, SummaryJob, SummaryOutcome};
