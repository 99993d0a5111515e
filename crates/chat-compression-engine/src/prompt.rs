//! Summarization prompt and fallback text

/// Characters of summary allowed per configured output token.
pub const CHARS_PER_TOKEN: usize = 3;

pub fn summary_char_budget(max_summary_tokens: u32) -> usize {
    (max_summary_tokens as usize).saturating_mul(CHARS_PER_TOKEN)
}

/// Fixed-structure instruction asking the model to compress `transcript`.
pub fn build_summary_prompt(transcript: &str, max_summary_tokens: u32) -> String {
    let budget = summary_char_budget(max_summary_tokens);
    format!(
        r#"You are a conversation context compressor. Compress the conversation below into a faithful summary that can replace it as context for the rest of the conversation. Follow these rules strictly:

Keep: topic and goals, user intent, key facts and figures, important parameters and constraints, dates and deadlines, decisions and conclusions, open items and their status, and technical details such as code and commands. Code must be kept verbatim in code blocks.
Drop: greetings, pleasantries, repetition, off-topic chatter and step-by-step process detail that is not needed later. Information that was later overturned may be kept only when marked as "Superseded: <note>".
Conflicts: when something was changed several times, keep the latest consistent conclusion and list unresolved or conflicting points under "Needs clarification".
Style: structured bullet points, objective and concise, written from a third-person perspective.
Length: the summary must stay within {budget} characters. Cut detail before cutting core conclusions.
Format: output only the summary text, with no preamble, commentary or notes about how it was produced. Use exactly these headings, writing "None" under any heading with nothing to report:
Core topic:
Key information:
Decisions / conclusions:
Follow-ups (owner / deadline if known):
Roles / preferences:
Risks / dependencies / assumptions:
Needs clarification:
Compression: about X characters of conversation -> about Y characters of summary (estimate)

Conversation:
{transcript}

Output the compressed summary now (summary text only)."#
    )
}

/// Written instead of a real summary when the model call fails.
pub fn fallback_summary(message_count: usize) -> String {
    format!(
        "[History overview] Contains approximately {} messages.",
        message_count
    )
}
