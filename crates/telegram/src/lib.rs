//! Thin Telegram Bot API client: long-poll inbox plus outbound reports.
//! Command routing lives in the engine; this crate only moves messages.

use std::time::Duration;

use anyhow::{Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Telegram rejects messages over 4096 chars; we cut well below that so the
/// truncation marker always fits.
const MAX_MESSAGE_CHARS: usize = 3900;

#[derive(Debug, Clone)]
pub struct TelegramBot {
    client: Client,
    base_url: String,
    chat_id: String,
    pub enabled: bool,
}

/// One inbound message that passed the chat-id filter.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub update_id: i64,
    pub text: String,
}

impl TelegramBot {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        let enabled = token.is_some() && chat_id.is_some();
        let token = token.unwrap_or_default();
        Self {
            client: Client::new(),
            base_url: format!("https://api.telegram.org/bot{token}"),
            chat_id: chat_id.unwrap_or_default(),
            enabled,
        }
    }

    /// Disabled bot for degraded/memory-only mode.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Send a message, truncated to the Telegram limit.  A Markdown parse
    /// failure is retried exactly once without `parse_mode`.
    pub async fn send_message(&self, text: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let text = truncate_message(text);
        let url = format!("{}/sendMessage", self.base_url);
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: Some("Markdown"),
            disable_web_page_preview: true,
        };

        match self.post_message(&url, &body).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "sendMessage with Markdown failed; retrying plain");
                let plain = SendMessageRequest {
                    parse_mode: None,
                    ..body
                };
                match self.post_message(&url, &plain).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(%err, "sendMessage failed");
                        false
                    }
                }
            }
        }
    }

    async fn post_message(&self, url: &str, body: &SendMessageRequest<'_>) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;

        let payload: TelegramResponse<serde_json::Value> = response.json().await?;
        if !payload.ok {
            bail!(payload
                .description
                .unwrap_or_else(|| "telegram sendMessage failed".to_string()));
        }
        Ok(())
    }

    /// Long-poll for updates after `offset`.  Returns raw updates; use
    /// [`TelegramBot::filter_own`] to keep only the configured chat.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<TelegramUpdate>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let url = format!("{}/getUpdates", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[
                ("offset", (offset + 1).to_string()),
                ("timeout", timeout_secs.to_string()),
            ])
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await?
            .error_for_status()?;

        let payload: TelegramResponse<Vec<TelegramUpdate>> = response.json().await?;
        if !payload.ok {
            bail!(payload
                .description
                .unwrap_or_else(|| "telegram getUpdates failed".to_string()));
        }
        Ok(payload.result.unwrap_or_default())
    }

    /// Keep text messages addressed to the configured chat id, in arrival
    /// order, mapped to `{update_id, text}`.
    pub fn filter_own(&self, updates: Vec<TelegramUpdate>) -> Vec<InboundMessage> {
        updates
            .into_iter()
            .filter_map(|update| {
                let message = update.message?;
                let text = message.text?;
                if message.chat.id.to_string() != self.chat_id {
                    return None;
                }
                Some(InboundMessage {
                    update_id: update.update_id,
                    text,
                })
            })
            .collect()
    }
}

fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
    format!("{truncated}\n... (truncated)")
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}
