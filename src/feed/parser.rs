use chrono::{DateTime, Utc};
use feed_rs::parser;

/// One syndicated entry, consumed once by the formatter.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub content: String,
    pub title: String,
    pub published: Option<DateTime<Utc>>,
}

/// A parsed feed document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    /// Items in document order.
    pub items: Vec<FeedItem>,
    /// The feed's own "last updated" time.
    pub updated: Option<DateTime<Utc>>,
}

/// Parses RSS, Atom or JSON Feed bytes.
///
/// An item's timestamp is its `updated` time, falling back to `published`.
/// Its body is the full content, falling back to the summary.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let content = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content))
                .unwrap_or_default();
            let title = entry.title.map(|t| t.content).unwrap_or_default();

            FeedItem {
                content,
                title,
                published: entry.updated.or(entry.published),
            }
        })
        .collect();

    Ok(ParsedFeed {
        items,
        updated: feed.updated,
    })
}
