use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

use chat_compression_core::ConversationSummary;
use chat_compression_engine::CompressionConfig;

const PREVIEW_CHARS: usize = 60;

fn preview(summary: &str) -> String {
    let flat = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

/// One line per record: chat id, message count, last update, preview.
pub fn render_list(summaries: &[ConversationSummary], limit: Option<usize>) -> String {
    if summaries.is_empty() {
        return "No summaries stored".to_string();
    }

    let shown = limit.unwrap_or(summaries.len()).min(summaries.len());
    let width = summaries[..shown]
        .iter()
        .map(|s| s.chat_id.chars().count())
        .max()
        .unwrap_or(0)
        .max("CHAT ID".len());

    let mut lines = vec![format!(
        "{:<width$}  {:>8}  {:<25}  {}",
        "CHAT ID", "MESSAGES", "UPDATED", "SUMMARY"
    )];
    for summary in &summaries[..shown] {
        lines.push(format!(
            "{:<width$}  {:>8}  {:<25}  {}",
            summary.chat_id,
            summary.compressed_message_count,
            summary.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            preview(&summary.summary)
        ));
    }
    if shown < summaries.len() {
        lines.push(format!("... {} more", summaries.len() - shown));
    }
    lines.join("\n")
}

pub fn expiry_cutoff(now: DateTime<Utc>, older_than_days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(older_than_days))
}

pub fn describe_config(config: &CompressionConfig) -> String {
    let model = config
        .summary_model()
        .unwrap_or("(conversation model)");
    format!(
        "Config OK: keeps {} head + {} tail messages, summarizes from {} messages\n\
         summary model: {}, max {} tokens, temperature {}, timeout {}s, priority {}",
        config.keep_first,
        config.keep_last,
        config.compression_threshold,
        model,
        config.max_summary_tokens,
        config.summary_temperature,
        config.summary_timeout_secs,
        config.priority
    )
}

pub fn check_config(path: &Path) -> Result<String> {
    let config = CompressionConfig::from_file(path)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(describe_config(&config))
}
