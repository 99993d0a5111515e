//! OpenAI-compatible chat-completions adapter

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use chat_compression_core::{
    ChatMessage, CompletionRequest, FinishReason, LLMError, LLMProvider, LLMResponse,
    MessageContent, TokenUsage,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const BASE_URL_ENV: &str = "OPENAI_API_BASE_URL";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Talks to any server exposing `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(120),
        }
    }

    /// Reads `OPENAI_API_BASE_URL` (optional) and `OPENAI_API_KEY` (optional;
    /// local servers usually need none).
    pub fn from_env() -> Self {
        let base_url = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        Self::new(base_url, api_key)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn map_reqwest_err(&self, err: reqwest::Error) -> LLMError {
        if err.is_timeout() {
            LLMError::Timeout(self.timeout)
        } else {
            LLMError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a MessageContent,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: &message.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

impl<'a> From<&'a CompletionRequest> for WireRequest<'a> {
    fn from(request: &'a CompletionRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            stream: request.stream,
            max_tokens: request.config.max_tokens,
            temperature: request.config.temperature,
            user: request.user.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    message: Option<WireChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Extract the first choice's text from a chat-completions response body.
pub fn parse_completion(body: &str) -> Result<LLMResponse, LLMError> {
    let wire: WireResponse = serde_json::from_str(body)
        .map_err(|e| LLMError::InvalidResponse(format!("malformed body: {}", e)))?;

    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LLMError::InvalidResponse("response has no choices".to_string()))?;

    let content = choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| LLMError::InvalidResponse("first choice has no content".to_string()))?;

    let mut response =
        LLMResponse::new(content, FinishReason::from_openai(choice.finish_reason.as_deref()));
    if let Some(model) = wire.model {
        response = response.with_model(model);
    }
    if let Some(usage) = wire.usage {
        response = response.with_usage(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens));
    }
    Ok(response)
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<LLMResponse, LLMError> {
        let body = WireRequest::from(request);
        debug!(model = %request.model, messages = request.messages.len(), "Sending completion request");

        let mut builder = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_reqwest_err(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_reqwest_err(e))?;

        if !status.is_success() {
            return Err(LLMError::Api {
                message: text,
                status: Some(status.as_u16()),
            });
        }

        parse_completion(&text)
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}
