//! Background summary generation

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, warn};

use chat_compression_core::{
    ChatMessage, CompletionRequest, LLMConfig, LLMError, LLMProvider, Result, SummaryStore,
};

use crate::config::CompressionConfig;
use crate::formatter::format_transcript;
use crate::locks::ConversationLocks;
use crate::policy::CompressionPolicy;
use crate::prompt::{build_summary_prompt, fallback_summary};

/// Everything a run needs, captured when the response completed.
#[derive(Debug, Clone)]
pub struct SummaryJob {
    pub chat_id: String,
    /// The full message list of the completed turn.
    pub messages: Vec<ChatMessage>,
    /// Model of the conversation, used when no summary model is configured.
    pub conversation_model: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizerState {
    Idle,
    Formatting,
    CallingLlm,
    Failed,
    Persisting,
    Done,
}

impl SummarizerState {
    pub fn can_transition_to(self, next: SummarizerState) -> bool {
        use SummarizerState::*;
        matches!(
            (self, next),
            (Idle, Formatting)
                | (Idle, Done)
                | (Formatting, CallingLlm)
                | (CallingLlm, Persisting)
                | (CallingLlm, Failed)
                | (Failed, Persisting)
                | (Persisting, Done)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Nothing between head and tail; the store was not touched.
    Skipped,
    Summarized { chars: usize },
    Fallback { reason: String },
}

struct RunState<'a> {
    chat_id: &'a str,
    state: SummarizerState,
    debug_mode: bool,
}

impl<'a> RunState<'a> {
    fn new(chat_id: &'a str, debug_mode: bool) -> Self {
        Self {
            chat_id,
            state: SummarizerState::Idle,
            debug_mode,
        }
    }

    fn advance(&mut self, next: SummarizerState) {
        if !self.state.can_transition_to(next) {
            warn!(chat_id = %self.chat_id, from = ?self.state, to = ?next, "Unexpected summarizer transition");
        }
        diag!(self.debug_mode, chat_id = %self.chat_id, from = ?self.state, to = ?next, "Summarizer state");
        self.state = next;
    }
}

/// Produces and persists summaries off the request path.
pub struct BackgroundSummarizer {
    config: Arc<CompressionConfig>,
    policy: CompressionPolicy,
    store: Arc<dyn SummaryStore>,
    llm: Arc<dyn LLMProvider>,
    locks: Arc<ConversationLocks>,
}

impl BackgroundSummarizer {
    pub fn new(
        config: Arc<CompressionConfig>,
        store: Arc<dyn SummaryStore>,
        llm: Arc<dyn LLMProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let policy = config.policy()?;
        Ok(Self {
            config,
            policy,
            store,
            llm,
            locks: Arc::new(ConversationLocks::new()),
        })
    }

    pub fn locks(&self) -> &Arc<ConversationLocks> {
        &self.locks
    }

    /// Detach a run. The handle may be dropped.
    pub fn spawn(self: &Arc<Self>, job: SummaryJob) -> JoinHandle<SummaryOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(job).await })
    }

    /// Summarize the middle of `job.messages` and store the result, or a
    /// fallback when the model call fails. Never returns an error.
    pub async fn run(&self, job: SummaryJob) -> SummaryOutcome {
        let _lease = self.locks.acquire(&job.chat_id).await;
        let debug_mode = self.config.debug_mode;
        let mut run = RunState::new(&job.chat_id, debug_mode);

        let range = self.policy.middle_range(job.messages.len());
        if range.is_empty() {
            diag!(debug_mode, chat_id = %job.chat_id, total = job.messages.len(), "No middle messages to summarize");
            run.advance(SummarizerState::Done);
            return SummaryOutcome::Skipped;
        }
        let middle = &job.messages[range];

        run.advance(SummarizerState::Formatting);
        let transcript = format_transcript(middle);
        diag!(
            debug_mode,
            chat_id = %job.chat_id,
            middle = middle.len(),
            transcript_chars = transcript.chars().count(),
            "Summarizing middle messages"
        );

        run.advance(SummarizerState::CallingLlm);
        let model = self
            .config
            .summary_model()
            .unwrap_or(job.conversation_model.as_str());

        let (text, outcome) = match self
            .generate(model, &transcript, job.user_id.clone())
            .await
        {
            Ok(summary) => {
                let chars = summary.chars().count();
                diag!(debug_mode, chat_id = %job.chat_id, model, chars, preview = %preview(&summary), "Summary generated");
                (summary, SummaryOutcome::Summarized { chars })
            }
            Err(e) => {
                run.advance(SummarizerState::Failed);
                if self.config.summary_model().is_none() {
                    error!(
                        chat_id = %job.chat_id,
                        model,
                        error = %e,
                        "Summary generation failed. No summary_model is configured, so the conversation's model was used; \
                         if it is a pipe or otherwise incompatible model, configure a compatible summary_model (e.g. 'gemini-2.5-flash')"
                    );
                } else {
                    error!(chat_id = %job.chat_id, model, error = %e, "Summary generation failed");
                }
                (
                    fallback_summary(middle.len()),
                    SummaryOutcome::Fallback {
                        reason: e.to_string(),
                    },
                )
            }
        };

        run.advance(SummarizerState::Persisting);
        if let Err(e) = self
            .store
            .save(&job.chat_id, &text, job.messages.len())
            .await
        {
            error!(chat_id = %job.chat_id, error = %e, "Failed to persist summary");
        }

        run.advance(SummarizerState::Done);
        outcome
    }

    async fn generate(
        &self,
        model: &str,
        transcript: &str,
        user: Option<String>,
    ) -> std::result::Result<String, LLMError> {
        if model.trim().is_empty() {
            return Err(LLMError::Config(
                "no summary_model configured and the conversation has no model".to_string(),
            ));
        }

        let prompt = build_summary_prompt(transcript, self.config.max_summary_tokens);
        let request = CompletionRequest::new(model, vec![ChatMessage::user(prompt)])
            .with_config(
                LLMConfig::new()
                    .with_max_tokens(self.config.max_summary_tokens)
                    .with_temperature(self.config.summary_temperature),
            )
            .with_user(user);

        let timeout = self.config.summary_timeout();
        let response = tokio::time::timeout(timeout, self.llm.complete(&request))
            .await
            .map_err(|_| LLMError::Timeout(timeout))??;

        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(LLMError::InvalidResponse(
                "model returned an empty summary".to_string(),
            ));
        }
        Ok(summary.to_string())
    }
}

fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 100;
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{conversation, CountingStore, FailingStore};
    use chat_compression_llm::MockLLMProvider;
    use std::time::Duration;

    fn job(chat_id: &str, len: usize) -> SummaryJob {
        SummaryJob {
            chat_id: chat_id.to_string(),
            messages: conversation(len),
            conversation_model: "chat-model".to_string(),
            user_id: Some("user-1".to_string()),
        }
    }

    fn summarizer(
        config: CompressionConfig,
        store: Arc<dyn SummaryStore>,
        llm: &MockLLMProvider,
    ) -> Arc<BackgroundSummarizer> {
        Arc::new(BackgroundSummarizer::new(Arc::new(config), store, Arc::new(llm.clone())).unwrap())
    }

    #[test]
    fn test_state_transitions() {
        use SummarizerState::*;
        assert!(Idle.can_transition_to(Formatting));
        assert!(Idle.can_transition_to(Done));
        assert!(CallingLlm.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Persisting));
        assert!(!Failed.can_transition_to(Done));
        assert!(!Formatting.can_transition_to(Persisting));
        assert!(!Done.can_transition_to(Idle));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let llm = MockLLMProvider::default();
        let result = BackgroundSummarizer::new(
            Arc::new(CompressionConfig::new(5, 1, 6)),
            Arc::new(CountingStore::new()),
            Arc::new(llm),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_success_persists_trimmed_summary() {
        let mut llm = MockLLMProvider::new("test");
        llm.set_response("  Core topic: files  \n");
        let store = CountingStore::new();
        let summarizer = summarizer(CompressionConfig::default(), Arc::new(store.clone()), &llm);

        let outcome = summarizer.run(job("chat-1", 20)).await;

        assert_eq!(outcome, SummaryOutcome::Summarized { chars: 17 });
        assert_eq!(store.saves(), 1);
        let saved = store.inner.load("chat-1").await.unwrap().unwrap();
        assert_eq!(saved.summary, "Core topic: files");
        assert_eq!(saved.compressed_message_count, 20);

        let call = llm.last_call().unwrap();
        assert_eq!(call.request.model, "chat-model");
        assert!(!call.request.stream);
        assert_eq!(call.request.messages.len(), 1);
        assert_eq!(call.request.config.max_tokens, Some(4000));
        assert_eq!(call.request.config.temperature, Some(0.3));
        assert_eq!(call.request.user.as_deref(), Some("user-1"));

        let prompt = call.request.messages[0].content.joined_text(" ");
        assert!(prompt.contains("[1] User: question 1"));
        assert!(prompt.contains("[13] Assistant: answer 13"));
        assert!(!prompt.contains("question 15"));
    }

    #[tokio::test]
    async fn test_run_uses_summary_model() {
        let llm = MockLLMProvider::new("test");
        let config = CompressionConfig::default().with_summary_model("gemini-2.5-flash");
        let summarizer = summarizer(config, Arc::new(CountingStore::new()), &llm);

        summarizer.run(job("chat-1", 20)).await;

        assert_eq!(llm.last_call().unwrap().request.model, "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn test_run_llm_error_writes_fallback() {
        let mut llm = MockLLMProvider::new("test");
        llm.set_error("upstream 502");
        let store = CountingStore::new();
        let summarizer = summarizer(CompressionConfig::default(), Arc::new(store.clone()), &llm);

        let outcome = summarizer.run(job("chat-1", 20)).await;

        assert!(matches!(outcome, SummaryOutcome::Fallback { ref reason } if reason.contains("upstream 502")));
        assert_eq!(store.saves(), 1);
        let saved = store.inner.load("chat-1").await.unwrap().unwrap();
        assert_eq!(
            saved.summary,
            "[History overview] Contains approximately 13 messages."
        );
        assert_eq!(saved.compressed_message_count, 20);
    }

    #[tokio::test]
    async fn test_run_blank_response_is_failure() {
        let mut llm = MockLLMProvider::new("test");
        llm.set_response("   \n ");
        let store = CountingStore::new();
        let summarizer = summarizer(CompressionConfig::default(), Arc::new(store.clone()), &llm);

        let outcome = summarizer.run(job("chat-1", 16)).await;

        assert!(matches!(outcome, SummaryOutcome::Fallback { .. }));
        let saved = store.inner.load("chat-1").await.unwrap().unwrap();
        assert_eq!(
            saved.summary,
            "[History overview] Contains approximately 9 messages."
        );
    }

    #[tokio::test]
    async fn test_run_without_any_model_falls_back() {
        let llm = MockLLMProvider::new("test");
        let store = CountingStore::new();
        let summarizer = summarizer(CompressionConfig::default(), Arc::new(store.clone()), &llm);

        let mut job = job("chat-1", 20);
        job.conversation_model = String::new();
        let outcome = summarizer.run(job).await;

        assert!(matches!(outcome, SummaryOutcome::Fallback { .. }));
        assert_eq!(llm.call_count(), 0);
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test]
    async fn test_run_timeout_writes_fallback() {
        let mut llm = MockLLMProvider::new("test");
        llm.set_latency(1500);
        let store = CountingStore::new();
        let config = CompressionConfig::default().with_summary_timeout(Duration::from_secs(1));
        let summarizer = summarizer(config, Arc::new(store.clone()), &llm);

        let outcome = summarizer.run(job("chat-1", 20)).await;

        assert!(matches!(outcome, SummaryOutcome::Fallback { ref reason } if reason.contains("timed out")));
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test]
    async fn test_run_empty_middle_skips() {
        let llm = MockLLMProvider::new("test");
        let store = CountingStore::new();
        let summarizer = summarizer(CompressionConfig::default(), Arc::new(store.clone()), &llm);

        let outcome = summarizer.run(job("chat-1", 7)).await;

        assert_eq!(outcome, SummaryOutcome::Skipped);
        assert_eq!(store.saves(), 0);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_survives_store_failure() {
        let llm = MockLLMProvider::new("test");
        let summarizer = summarizer(CompressionConfig::default(), Arc::new(FailingStore), &llm);

        let outcome = summarizer.run(job("chat-1", 20)).await;

        assert!(matches!(outcome, SummaryOutcome::Summarized { .. }));
    }

    #[tokio::test]
    async fn test_runs_for_one_conversation_do_not_overlap() {
        let mut llm = MockLLMProvider::new("test");
        llm.set_responses(vec!["first".to_string(), "second".to_string()], false);
        llm.set_latency(30);
        let store = CountingStore::new();
        let summarizer = summarizer(CompressionConfig::default(), Arc::new(store.clone()), &llm);

        let a = summarizer.spawn(job("chat-1", 20));
        let b = summarizer.spawn(job("chat-1", 22));
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(llm.max_concurrent_calls(), 1);
        assert_eq!(store.saves(), 2);
        let saved = store.inner.load("chat-1").await.unwrap().unwrap();
        assert_eq!(saved.summary, "second");
        assert_eq!(saved.compressed_message_count, 22);
        assert_eq!(summarizer.locks().active(), 0);
    }

    #[tokio::test]
    async fn test_runs_for_different_conversations_overlap() {
        let mut llm = MockLLMProvider::new("test");
        llm.set_latency(30);
        let summarizer = summarizer(CompressionConfig::default(), Arc::new(CountingStore::new()), &llm);

        let a = summarizer.spawn(job("chat-a", 20));
        let b = summarizer.spawn(job("chat-b", 20));
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(llm.max_concurrent_calls(), 2);
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview(&"x".repeat(150)).chars().count(), 103);
    }
}
