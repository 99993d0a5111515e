//! When to compress and when to summarize

use std::ops::Range;

use chat_compression_core::{CompressionError, Result};

/// Validated retention counts and trigger threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    threshold: usize,
    keep_first: usize,
    keep_last: usize,
}

impl CompressionPolicy {
    pub fn new(threshold: usize, keep_first: usize, keep_last: usize) -> Result<Self> {
        let retained = keep_first.checked_add(keep_last).ok_or_else(|| {
            CompressionError::Config(format!(
                "keep_first ({}) + keep_last ({}) overflows",
                keep_first, keep_last
            ))
        })?;

        if threshold <= retained {
            return Err(CompressionError::Config(format!(
                "compression_threshold ({}) must be greater than keep_first ({}) + keep_last ({})",
                threshold, keep_first, keep_last
            )));
        }

        Ok(Self {
            threshold,
            keep_first,
            keep_last,
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn keep_first(&self) -> usize {
        self.keep_first
    }

    pub fn keep_last(&self) -> usize {
        self.keep_last
    }

    pub fn retained_count(&self) -> usize {
        self.keep_first + self.keep_last
    }

    /// A stored summary exists and there is something between the kept head and tail.
    pub fn should_compress_inbound(&self, message_count: usize, has_summary: bool) -> bool {
        has_summary && message_count > self.retained_count()
    }

    pub fn should_trigger_summarization(&self, message_count: usize) -> bool {
        message_count >= self.threshold
    }

    /// Indices of the messages a summary stands in for. Empty when the kept
    /// head and tail already cover the whole list.
    pub fn middle_range(&self, message_count: usize) -> Range<usize> {
        let start = self.keep_first.min(message_count);
        let end = message_count.saturating_sub(self.keep_last).max(start);
        start..end
    }
}
