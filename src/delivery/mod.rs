//! Chat backends that formatted jokes are delivered through.
//!
//! [`DeliveryChannel`] is the seam between the feed pipeline and a messaging
//! service. It also owns the sync watermark, since only the channel knows
//! which items actually reached users.
//!
//! - [`TelegramChannel`] - Telegram Bot API
//! - [`ConsoleChannel`] - prints to stdout, for dry runs

mod console;
mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use console::ConsoleChannel;
pub use telegram::{TelegramChannel, TelegramConfig, DEFAULT_API_BASE_URL};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Chat API rejected message ({status}): {description}")]
    Rejected { status: u16, description: String },
    #[error("Delivered to {delivered} of {total} group chats")]
    Partial { delivered: usize, total: usize },
    #[error("No group chats configured")]
    NoGroups,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeliveryError {
    /// True when resending the same message to the same chat cannot succeed:
    /// the API refused the request itself (400) or the bot lost access to the
    /// chat (403).
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Rejected { status: 400 | 403, .. })
    }
}

/// A messaging backend plus the watermark of what it has delivered.
///
/// Errors never abort the caller's process; the poller decides whether to
/// skip, retry or hold the watermark back.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Delivers one message to one chat.
    async fn send(&self, message: &str, chat_id: &str) -> Result<(), DeliveryError>;

    /// Sends the fixed welcome text to a chat.
    async fn greet(&self, chat_id: &str) -> Result<(), DeliveryError>;

    /// Broadcasts a message to every configured group chat.
    ///
    /// Chats that permanently refuse the message count as handled. Only
    /// failures worth retrying make the broadcast fail.
    async fn send_group(&self, message: &str) -> Result<(), DeliveryError>;

    /// Sends the fixed "couldn't fetch jokes" notice to a chat.
    async fn apologize(&self, chat_id: &str) -> Result<(), DeliveryError>;

    /// Records the watermark once every item of a cycle has been delivered.
    async fn sync_time(&self, new_fetched_at: Option<DateTime<Utc>>) -> Result<(), DeliveryError>;

    /// Reads the watermark to seed the next fetch.
    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, DeliveryError>;
}

pub(crate) fn greeting_text(bot_name: &str) -> String {
    format!("Hi! I'm {bot_name}. I'll post fresh jokes here as soon as they're submitted.")
}

pub(crate) const APOLOGY_TEXT: &str =
    "Sorry, I couldn't fetch new jokes right now. I'll try again shortly.";
