//! Rebuilds the outgoing message list around a stored summary

use serde_json::Value;

use chat_compression_core::{ChatMessage, ContentPart, MessageContent};

use crate::policy::CompressionPolicy;

pub const SUMMARY_HEADER: &str = "[Conversation summary]";
pub const RECENT_MARKER: &str = "Recent conversation follows:";

/// The text prepended to the first kept message.
pub fn summary_block(summary: &str) -> String {
    format!(
        "{}\n{}\n\n---\n{}\n\n",
        SUMMARY_HEADER, summary, RECENT_MARKER
    )
}

/// Prepend `block` to the first text part of `message`, adding a leading
/// text part when there is none. Non-text parts keep their order.
pub fn inject_summary(message: &mut ChatMessage, block: &str) {
    let content = std::mem::take(&mut message.content);
    message.content = match content {
        MessageContent::Text(text) => MessageContent::Text(format!("{}{}", block, text)),
        MessageContent::Parts(mut parts) => {
            match parts.iter().position(ContentPart::is_text) {
                Some(idx) => {
                    if let ContentPart::Text { text } = &mut parts[idx] {
                        text.insert_str(0, block);
                    }
                }
                None => parts.insert(0, ContentPart::text(block)),
            }
            MessageContent::Parts(parts)
        }
        MessageContent::Other(Value::Null) => MessageContent::Text(block.to_string()),
        MessageContent::Other(value) => {
            MessageContent::Parts(vec![ContentPart::text(block), ContentPart::Opaque(value)])
        }
    };
}

/// Head (with the summary injected), then tail. With no head a synthetic
/// system message carries the summary instead.
pub fn compress(
    messages: &[ChatMessage],
    keep_first: usize,
    keep_last: usize,
    summary: &str,
) -> Vec<ChatMessage> {
    let block = summary_block(summary);
    let head_end = keep_first.min(messages.len());
    let tail_start = messages.len().saturating_sub(keep_last).max(head_end);

    let mut out = Vec::with_capacity(head_end + (messages.len() - tail_start) + 1);
    if head_end > 0 {
        out.extend_from_slice(&messages[..head_end]);
        inject_summary(&mut out[0], &block);
    } else {
        out.push(ChatMessage::system(block));
    }
    out.extend_from_slice(&messages[tail_start..]);
    out
}

/// Compressed list when `policy` allows it and a summary is present,
/// otherwise an unchanged copy of `messages`.
pub fn assemble(
    messages: &[ChatMessage],
    policy: &CompressionPolicy,
    summary: Option<&str>,
) -> Vec<ChatMessage> {
    match summary {
        Some(summary) if policy.should_compress_inbound(messages.len(), true) => compress(
            messages,
            policy.keep_first(),
            policy.keep_last(),
            summary,
        ),
        _ => messages.to_vec(),
    }
}
