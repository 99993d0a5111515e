//! Plain-text transcript of the messages a summary replaces

use chat_compression_core::{ChatMessage, Role};

/// Per-message character cap in the transcript.
pub const MAX_MESSAGE_CHARS: usize = 500;

fn role_label(role: &Role) -> &str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        other => other.as_str(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Renders `[i] Role: text` entries separated by a blank line, numbering from 1.
///
/// Multimodal content contributes only its text parts, joined by a space.
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let text = message.content.joined_text(" ");
            format!(
                "[{}] {}: {}",
                i + 1,
                role_label(&message.role),
                truncate_chars(&text, MAX_MESSAGE_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
