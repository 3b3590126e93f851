use crate::feed::fetcher::{retrieve, FetchError};
use crate::feed::palette::{ConfigurationError, EmojiPalette};
use crate::feed::parser::ParsedFeed;
use crate::feed::sanitize::sanitize_content;
use crate::feed::{FetchedFeed, Feeder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Emoji drawn per message: four above the joke, four below.
const EMOJI_PER_MESSAGE: usize = 8;

/// Whether an item stamped `candidate` is newer than the watermark and so
/// still needs delivering.
///
/// With no watermark everything is eligible. An item without a timestamp is
/// never treated as new once a watermark exists. Equal timestamps count as
/// already delivered.
pub fn is_synced_time(
    candidate: Option<DateTime<Utc>>,
    last_synced: Option<DateTime<Utc>>,
) -> bool {
    match (candidate, last_synced) {
        (_, None) => true,
        (Some(candidate), Some(last)) => candidate > last,
        (None, Some(_)) => false,
    }
}

/// A subreddit joke feed delivered under a bot's name.
pub struct JokesFeed {
    client: reqwest::Client,
    url: String,
    bot_name: String,
    palette: EmojiPalette,
    fetch_timeout: Duration,
    /// Update time reported by the last successful fetch. Advisory only: the
    /// watermark callers pass in is authoritative.
    last_updated_at: Mutex<Option<DateTime<Utc>>>,
}

impl JokesFeed {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        bot_name: impl Into<String>,
        fetch_timeout: Duration,
        palette: EmojiPalette,
    ) -> Result<Self, ConfigurationError> {
        if fetch_timeout.is_zero() {
            return Err(ConfigurationError::ZeroTimeout);
        }

        Ok(Self {
            client,
            url: url.into(),
            bot_name: bot_name.into(),
            palette,
            fetch_timeout,
            last_updated_at: Mutex::new(None),
        })
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        *self
            .last_updated_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Formats one post as a chat message:
    ///
    /// ```text
    /// e0 e1 e2 e3
    ///
    /// <title>
    ///
    /// <sanitized body>
    ///
    /// e4 e5 e6 e7
    ///
    /// by <bot name>
    /// ```
    pub fn parse_content(&self, content: &str, title: &str) -> String {
        let body = sanitize_content(content);
        let e = self.emoji_injector(EMOJI_PER_MESSAGE);

        format!(
            "{} {} {} {}\n\n{}\n\n{}\n\n{} {} {} {}\n\nby {}",
            e[0], e[1], e[2], e[3], title, body, e[4], e[5], e[6], e[7], self.bot_name
        )
    }

    /// Draws `count` random emoji from this feed's palette.
    pub fn emoji_injector(&self, count: usize) -> Vec<String> {
        self.palette.draw(count)
    }

    pub fn is_synced_time(
        &self,
        candidate: Option<DateTime<Utc>>,
        last_synced: Option<DateTime<Utc>>,
    ) -> bool {
        is_synced_time(candidate, last_synced)
    }

    async fn retrieve_feed(&self) -> Result<ParsedFeed, FetchError> {
        match retrieve(&self.client, &self.url, self.fetch_timeout).await {
            Ok(feed) => {
                *self
                    .last_updated_at
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = feed.updated;
                Ok(feed)
            }
            Err(e) => {
                tracing::error!(feed = %self.url, error = %e, "Error fetching feed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Feeder for JokesFeed {
    async fn fetch_feed_unsync(&self) -> Result<FetchedFeed, FetchError> {
        let feed = self.retrieve_feed().await?;

        let items: Vec<String> = feed
            .items
            .iter()
            .map(|item| self.parse_content(&item.content, &item.title))
            .collect();

        tracing::info!(
            feed = %self.url,
            items = feed.items.len(),
            updated = ?feed.updated,
            new = items.len(),
            "Fetched feed"
        );

        Ok(FetchedFeed {
            items,
            updated_at: feed.updated,
        })
    }

    async fn fetch_feed(
        &self,
        last_synced: Option<DateTime<Utc>>,
    ) -> Result<FetchedFeed, FetchError> {
        let feed = self.retrieve_feed().await?;

        let mut up_to_date = 0usize;
        let mut items = Vec::new();
        for item in &feed.items {
            if !is_synced_time(item.published, last_synced) {
                up_to_date += 1;
                continue;
            }
            items.push(self.parse_content(&item.content, &item.title));
        }

        tracing::info!(
            feed = %self.url,
            items = feed.items.len(),
            updated = ?feed.updated,
            up_to_date,
            new = items.len(),
            "Fetched feed"
        );

        Ok(FetchedFeed {
            items,
            updated_at: feed.updated,
        })
    }

    fn feed_name(&self) -> &str {
        &self.bot_name
    }
}
