use crate::delivery::{greeting_text, DeliveryChannel, DeliveryError, APOLOGY_TEXT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Mutex;
use tokio::sync::RwLock;

/// Writes messages to a sink instead of a chat service. Used by `--dry-run`.
pub struct ConsoleChannel {
    bot_name: String,
    out: Mutex<Box<dyn Write + Send>>,
    last_synced: RwLock<Option<DateTime<Utc>>>,
}

impl ConsoleChannel {
    /// A channel that prints to stdout.
    pub fn stdout(bot_name: impl Into<String>) -> Self {
        Self::with_writer(bot_name, Box::new(std::io::stdout()))
    }

    pub fn with_writer(bot_name: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            bot_name: bot_name.into(),
            out: Mutex::new(out),
            last_synced: RwLock::new(None),
        }
    }

    fn write_block(&self, target: &str, message: &str) -> Result<(), DeliveryError> {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "--- to {target} ---\n{message}\n")?;
        out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryChannel for ConsoleChannel {
    async fn send(&self, message: &str, chat_id: &str) -> Result<(), DeliveryError> {
        self.write_block(chat_id, message)
    }

    async fn greet(&self, chat_id: &str) -> Result<(), DeliveryError> {
        self.write_block(chat_id, &greeting_text(&self.bot_name))
    }

    async fn send_group(&self, message: &str) -> Result<(), DeliveryError> {
        self.write_block("group", message)
    }

    async fn apologize(&self, chat_id: &str) -> Result<(), DeliveryError> {
        self.write_block(chat_id, APOLOGY_TEXT)
    }

    async fn sync_time(&self, new_fetched_at: Option<DateTime<Utc>>) -> Result<(), DeliveryError> {
        if let Some(at) = new_fetched_at {
            *self.last_synced.write().await = Some(at);
        }
        Ok(())
    }

    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, DeliveryError> {
        Ok(*self.last_synced.read().await)
    }
}
