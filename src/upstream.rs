//! Client side of the upstream chat-completion API.
//!
//! The handlers depend on the [`CompletionProvider`] trait only.  The
//! [`OpenAiClient`] implementation posts an OpenAI-compatible
//! `chat/completions` request with a bearer key and hands the JSON body back
//! untouched, alongside a typed view of the parts the gateway reads.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 200;

/// Longest slice of an upstream error body kept for the server log.
const ERROR_BODY_LOG_LIMIT: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Anything else the client sent (`name`, ...) is forwarded untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_owned(),
            content: Some(content.into()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Body sent to the provider.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Deserialize)]
struct CompletionView {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChoiceView>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChoiceView {
    message: Option<MessageView>,
}

#[derive(Deserialize)]
struct MessageView {
    content: Option<String>,
}

/// Successful provider answer.  `body` is exactly what the provider sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub body: Value,
    pub model: Option<String>,
    pub content: Option<String>,
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    pub fn from_value(body: Value) -> Result<Self, UpstreamError> {
        if !body.is_object() {
            return Err(UpstreamError::Decode(
                "completion body is not a JSON object".into(),
            ));
        }
        let view = CompletionView::deserialize(&body)
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        let content = view
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content);
        Ok(Self {
            model: view.model,
            content,
            usage: view.usage,
            body,
        })
    }

    /// First choice's text, trimmed.  Errors when the provider returned no
    /// text at all.
    pub fn trimmed_content(&self) -> Result<&str, UpstreamError> {
        self.content
            .as_deref()
            .map(str::trim)
            .ok_or(UpstreamError::EmptyCompletion)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed upstream response: {0}")]
    Decode(String),
    #[error("upstream response carried no completion text")]
    EmptyCompletion,
}

/// The external chat-completion capability.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn create_completion(
        &self,
        api_key: &str,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse, UpstreamError>;
}

/// `reqwest` client for an OpenAI-compatible endpoint.  One attempt per
/// call, bounded only by the client timeout.
pub struct OpenAiClient {
    url: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiClient {
    async fn create_completion(
        &self,
        api_key: &str,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse, UpstreamError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(req)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&text),
            });
        }
        let json: Value =
            serde_json::from_str(&text).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        CompletionResponse::from_value(json)
    }
}

fn truncate_for_log(text: &str) -> String {
    if text.len() <= ERROR_BODY_LOG_LIMIT {
        return text.to_string();
    }
    let mut end = ERROR_BODY_LOG_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
