//! Chat-completions client for the two LLM roles the engine addresses:
//! the dreamer (architect) and the coder (codegen).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

// ── Chat message types ────────────────────────────────────────────────────────

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A successful chat completion.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Provider replied without usable text.  `finish_reason` is surfaced
    /// verbatim so callers can distinguish truncation from filtering.
    #[error("empty content (finish_reason: {finish_reason})")]
    EmptyContent { finish_reason: String, usage: TokenUsage },
    #[error("api error: {0}")]
    Api(String),
    #[error("request timeout after {0:?}")]
    Timeout(Duration),
    #[error("no api key configured")]
    Unconfigured,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl LlmError {
    /// Usage is still tracked for failed calls where the provider reported it.
    pub fn usage(&self) -> TokenUsage {
        match self {
            LlmError::EmptyContent { usage, .. } => *usage,
            _ => TokenUsage::default(),
        }
    }

    /// Provider-side throttling shows up as a 429 or a rate-limit message.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            LlmError::Api(msg) => msg.contains("429") || msg.to_lowercase().contains("rate limit"),
            _ => false,
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// One configured model endpoint.  The engine holds two of these — one per
/// role — rather than routing through a shared client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    pub model: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send a chat-completions request and return the assistant text.
    ///
    /// The request shape is `{model, messages, max_tokens, temperature}`;
    /// consumed response fields are `choices[0].message.content`,
    /// `choices[0].finish_reason` and `usage`.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<ChatReply, LlmError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(LlmError::Unconfigured);
        };

        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let request = self
            .client
            .post(&endpoint)
            .bearer_auth(api_key)
            .header("HTTP-Referer", "https://github.com/ouro-sys/ouro")
            .header("X-Title", "Ouro")
            .json(&payload)
            .timeout(timeout)
            .send();

        let response = match request.await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return Err(LlmError::Timeout(timeout)),
            Err(err) => return Err(err.into()),
        };

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Api(format!("{status}: {body}")));
        }

        parse_chat_response(&body)
    }
}

/// Parse a chat-completions response body.  Pure so the empty-content and
/// finish-reason handling is testable without a network.
pub fn parse_chat_response(body: &serde_json::Value) -> Result<ChatReply, LlmError> {
    let choice = match body.get("choices").and_then(|c| c.get(0)) {
        Some(choice) => choice,
        None => return Err(LlmError::Api(format!("response missing choices: {body}"))),
    };

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let usage = body
        .get("usage")
        .map(|u| TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
        })
        .unwrap_or_default();

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("");

    if content.trim().is_empty() {
        tracing::warn!(finish_reason = %finish_reason, "provider returned empty content");
        return Err(LlmError::EmptyContent { finish_reason, usage });
    }

    Ok(ChatReply {
        content: content.to_string(),
        finish_reason,
        usage,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
