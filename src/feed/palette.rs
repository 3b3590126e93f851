use rand::Rng;
use std::sync::Arc;
use thiserror::Error;

/// Emoji used when the configuration does not provide its own list.
pub const DEFAULT_EMOJIS: &[&str] = &[
    "😂", "🤣", "😆", "😹", "😜", "😝", "🙃", "😄", "😁", "🤪", "🥳", "🎉", "🤡", "👻", "🐒",
    "🍌", "🔥", "💥", "✨", "🎭",
];

/// Startup-time misconfiguration of a feed source.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Emoji palette must contain at least one emoji")]
    EmptyPalette,
    #[error("Fetch timeout must be greater than zero")]
    ZeroTimeout,
}

/// Immutable, non-empty list of emoji that messages are decorated with.
///
/// Cloning shares the underlying list, so one palette can back any number of
/// feed sources running side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiPalette {
    emojis: Arc<[String]>,
}

impl EmojiPalette {
    /// Builds a palette, rejecting an empty list.
    pub fn new(emojis: Vec<String>) -> Result<Self, ConfigurationError> {
        if emojis.is_empty() {
            return Err(ConfigurationError::EmptyPalette);
        }
        Ok(Self {
            emojis: emojis.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.emojis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emojis.is_empty()
    }

    pub fn contains(&self, emoji: &str) -> bool {
        self.emojis.iter().any(|e| e == emoji)
    }

    /// Draws `count` emoji uniformly at random, with replacement.
    pub fn draw(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        // `gen_range` panics on an empty range; the constructor rules that out.
        (0..count)
            .map(|_| self.emojis[rng.gen_range(0..self.emojis.len())].clone())
            .collect()
    }
}

impl Default for EmojiPalette {
    fn default() -> Self {
        Self {
            emojis: DEFAULT_EMOJIS.iter().map(|e| (*e).to_string()).collect(),
        }
    }
}
