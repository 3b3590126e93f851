//! Feed retrieval and message formatting.
//!
//! - [`fetcher`] - HTTP download bounded by a deadline
//! - [`parser`] - RSS/Atom parsing via `feed-rs`
//! - [`sanitize`] - markup and Reddit footer cleanup
//! - [`palette`] - the emoji a message is decorated with
//! - [`jokes`] - [`JokesFeed`], the subreddit-backed [`Feeder`]
//!
//! # Example
//!
//! ```ignore
//! use jokebot::feed::{EmojiPalette, Feeder, JokesFeed};
//!
//! let feed = JokesFeed::new(client, url, "JokesBot", timeout, EmojiPalette::default())?;
//! let fetched = feed.fetch_feed(last_synced).await?;
//! for message in fetched.items { /* deliver */ }
//! ```

mod fetcher;
mod jokes;
mod palette;
mod parser;
pub mod sanitize;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use fetcher::FetchError;
pub use jokes::{is_synced_time, JokesFeed};
pub use palette::{ConfigurationError, EmojiPalette, DEFAULT_EMOJIS};
pub use parser::{parse_feed, FeedItem, ParsedFeed};

/// Formatted messages from one fetch, plus the feed's reported update time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedFeed {
    /// Ready-to-send messages in feed order.
    pub items: Vec<String>,
    /// The new watermark. Present even when `items` is empty.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A source of formatted messages.
///
/// Implementations are not meant to be polled concurrently: a caller should
/// finish one fetch, deliver it and persist the watermark before the next.
#[async_trait]
pub trait Feeder: Send + Sync {
    /// Fetches and formats every item, ignoring any watermark.
    async fn fetch_feed_unsync(&self) -> Result<FetchedFeed, FetchError>;

    /// Fetches and formats only items strictly newer than `last_synced`.
    async fn fetch_feed(
        &self,
        last_synced: Option<DateTime<Utc>>,
    ) -> Result<FetchedFeed, FetchError>;

    /// The display name messages are signed with.
    fn feed_name(&self) -> &str;
}
