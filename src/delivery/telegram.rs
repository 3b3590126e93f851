use crate::delivery::{greeting_text, DeliveryChannel, DeliveryError, APOLOGY_TEXT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Longest text one `sendMessage` call accepts, in UTF-16 code units.
const MAX_MESSAGE_LEN: usize = 4096;

/// Connection settings for the Telegram Bot API.
///
/// The bot token is part of every request URL, so it is kept secret and
/// stripped from any error before it can reach a log line.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub group_chat_ids: Vec<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("group_chat_ids", &self.group_chat_ids)
            .finish()
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Delivers messages through a Telegram bot.
///
/// The watermark lives in memory for the lifetime of the process.
pub struct TelegramChannel {
    client: reqwest::Client,
    config: TelegramConfig,
    bot_name: String,
    last_synced: RwLock<Option<DateTime<Utc>>>,
}

impl TelegramChannel {
    pub fn new(
        client: reqwest::Client,
        config: TelegramConfig,
        bot_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            config,
            bot_name: bot_name.into(),
            last_synced: RwLock::new(None),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.bot_token.expose_secret(),
            method
        )
    }

    async fn send_message(&self, text: &str, chat_id: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest {
                chat_id,
                text,
            })
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.without_url()))?;

        let status = response.status();
        // Telegram explains rejections in the body, even on 4xx.
        match response.json::<ApiResponse>().await {
            Ok(reply) if reply.ok && status.is_success() => Ok(()),
            Ok(reply) => Err(DeliveryError::Rejected {
                status: status.as_u16(),
                description: reply
                    .description
                    .unwrap_or_else(|| format!("status {}", status.as_u16())),
            }),
            Err(_) if !status.is_success() => Err(DeliveryError::HttpStatus(status.as_u16())),
            Err(e) => Err(DeliveryError::Network(e.without_url())),
        }
    }
}

/// Splits `text` into pieces of at most `limit` UTF-16 code units, breaking
/// after the last newline that fits when there is one. Text within the limit
/// comes back as a single piece.
fn split_message(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while let Some(overflow) = overflow_offset(rest, limit) {
        let end = match rest[..overflow].rfind('\n') {
            Some(newline) if newline > 0 => newline + 1,
            _ => overflow,
        };
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }

    chunks.push(rest);
    chunks
}

/// Byte offset of the first char that takes `text` past `limit` UTF-16 units.
fn overflow_offset(text: &str, limit: usize) -> Option<usize> {
    let mut units = 0;
    for (i, c) in text.char_indices() {
        units += c.len_utf16();
        if units > limit {
            // Always make progress, even if one char alone is over the limit.
            return Some(if i == 0 { c.len_utf8() } else { i });
        }
    }
    None
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, message: &str, chat_id: &str) -> Result<(), DeliveryError> {
        for chunk in split_message(message, MAX_MESSAGE_LEN) {
            self.send_message(chunk, chat_id).await?;
        }
        Ok(())
    }

    async fn greet(&self, chat_id: &str) -> Result<(), DeliveryError> {
        self.send(&greeting_text(&self.bot_name), chat_id).await
    }

    async fn send_group(&self, message: &str) -> Result<(), DeliveryError> {
        let total = self.config.group_chat_ids.len();
        if total == 0 {
            return Err(DeliveryError::NoGroups);
        }

        let mut delivered = 0;
        let mut refused = 0;
        for chat_id in &self.config.group_chat_ids {
            match self.send(message, chat_id).await {
                Ok(()) => delivered += 1,
                Err(e) if e.is_permanent() => {
                    refused += 1;
                    tracing::warn!(chat_id = %chat_id, error = %e, "Group chat refused message, skipping it");
                }
                Err(e) => {
                    tracing::warn!(chat_id = %chat_id, error = %e, "Failed to deliver to group chat");
                }
            }
        }

        if delivered + refused < total {
            return Err(DeliveryError::Partial { delivered, total });
        }
        Ok(())
    }

    async fn apologize(&self, chat_id: &str) -> Result<(), DeliveryError> {
        self.send(APOLOGY_TEXT, chat_id).await
    }

    /// `None` leaves the stored watermark untouched.
    async fn sync_time(&self, new_fetched_at: Option<DateTime<Utc>>) -> Result<(), DeliveryError> {
        if let Some(at) = new_fetched_at {
            *self.last_synced.write().await = Some(at);
            tracing::debug!(watermark = %at, "Sync time updated");
        }
        Ok(())
    }

    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, DeliveryError> {
        Ok(*self.last_synced.read().await)
    }
}
