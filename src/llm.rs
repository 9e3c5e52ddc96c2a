//! Language-model gateway: a chat-completion seam plus an OpenRouter client.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::thread::sleep;
use std::time::Duration;
use thiserror::Error;

/// Fixed pause after the provider answers 429.
pub const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum LlmError {
    /// Connection failed, timed out, or the body could not be read.
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx answer other than 429.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("rate limited by provider")]
    RateLimited,

    /// Response envelope was not the expected chat-completion shape.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("empty response from model")]
    EmptyResponse,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// Outcome of a call that asked for a JSON answer.
#[derive(Clone, Debug, PartialEq)]
pub enum StructuredReply {
    Json(Value),
    /// No usable JSON. `raw` holds the model text when there was any.
    Unparsed { reason: String, raw: Option<String> },
}

pub trait LlmGateway: Sync {
    /// One chat completion; returns the assistant message text.
    fn complete(&self, messages: &[ChatMessage], model: &str, json_mode: bool) -> Result<String, LlmError>;

    /// Free-text answer to a system + user prompt pair.
    fn classify(&self, system: &str, user: &str, model: &str) -> Result<String, LlmError> {
        self.complete(&[ChatMessage::system(system), ChatMessage::user(user)], model, false)
    }

    /// JSON-mode call. Never fails: problems come back as `Unparsed`.
    fn analyze_structured(&self, system: &str, user: &str, model: &str) -> StructuredReply {
        match self.complete(&[ChatMessage::system(system), ChatMessage::user(user)], model, true) {
            Ok(text) => match parse_json_reply(&text) {
                Some(v) => StructuredReply::Json(v),
                None => StructuredReply::Unparsed {
                    reason: "Failed to parse JSON response".to_string(),
                    raw: Some(text),
                },
            },
            Err(e) => {
                tracing::warn!(model, error = %e, "structured completion failed");
                StructuredReply::Unparsed { reason: e.to_string(), raw: None }
            }
        }
    }
}

/// Parse model text as JSON, tolerating a surrounding ```json fence.
pub fn parse_json_reply(text: &str) -> Option<Value> {
    let t = text.trim();
    if let Ok(v) = serde_json::from_str(t) {
        return Some(v);
    }
    let inner = t.strip_prefix("```")?.strip_suffix("```")?;
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    serde_json::from_str(inner.trim()).ok()
}

/// Case-insensitive "yes" anywhere in the reply.
pub fn is_affirmative(text: &str) -> bool {
    text.to_lowercase().contains("yes")
}

pub struct OpenRouterClient {
    http: Client,
    api_url: String,
    api_key: String,
    rate_limit_pause: Duration,
}

impl OpenRouterClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
            rate_limit_pause: RATE_LIMIT_PAUSE,
        })
    }

    pub fn with_rate_limit_pause(mut self, pause: Duration) -> Self {
        self.rate_limit_pause = pause;
        self
    }
}

/// `choices[0].message.content` of a chat-completion response.
pub fn extract_content(body: &Value) -> Result<String, LlmError> {
    let content = body
        .pointer("/choices/0/message/content")
        .ok_or_else(|| LlmError::Parse("response has no choices[0].message.content".into()))?;
    match content {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::String(_) | Value::Null => Err(LlmError::EmptyResponse),
        _ => Err(LlmError::Parse("message content is not text".into())),
    }
}

impl LlmGateway for OpenRouterClient {
    fn complete(&self, messages: &[ChatMessage], model: &str, json_mode: bool) -> Result<String, LlmError> {
        let mut payload = json!({ "model": model, "messages": messages });
        if json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            tracing::warn!(model, pause_secs = self.rate_limit_pause.as_secs(), "rate limited; pausing");
            sleep(self.rate_limit_pause);
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let body: Value = resp.json().map_err(|e| LlmError::Parse(e.to_string()))?;
        extract_content(&body)
    }
}
