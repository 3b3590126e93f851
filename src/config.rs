//! Configuration file parser for ~/.config/jokebot/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use crate::delivery::DEFAULT_API_BASE_URL;
use crate::feed::{ConfigurationError, EmojiPalette};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `telegram.bot_token`.
pub const TOKEN_ENV_VAR: &str = "JOKEBOT_TELEGRAM_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

impl From<ConfigurationError> for ConfigError {
    fn from(e: ConfigurationError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level bot configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed to poll.
    pub feed_url: String,

    /// Name messages are signed with.
    pub bot_name: String,

    /// Deadline for a single feed retrieval, in seconds. Must be > 0.
    pub fetch_timeout_secs: u64,

    /// Time between sync cycles, in seconds. Must be > 0.
    pub poll_interval_secs: u64,

    /// Replaces the built-in emoji palette. Must not be empty if set.
    pub emojis: Option<Vec<String>>,

    pub telegram: TelegramSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: "https://www.reddit.com/r/Jokes/.rss".to_string(),
            bot_name: "JokesBot".to_string(),
            fetch_timeout_secs: 60,
            poll_interval_secs: 300,
            emojis: None,
            telegram: TelegramSection::default(),
        }
    }
}

/// The `[telegram]` table.
///
/// Custom Debug impl masks `bot_token` to prevent secret leakage in logs.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    /// Bot API token (alternative to JOKEBOT_TELEGRAM_TOKEN env var).
    /// Env var takes precedence over config file.
    pub bot_token: Option<String>,
    pub api_base_url: String,
    pub group_chat_ids: Vec<String>,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            group_chat_ids: Vec::new(),
        }
    }
}

impl std::fmt::Debug for TelegramSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSection")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base_url", &self.api_base_url)
            .field("group_chat_ids", &self.group_chat_ids)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), feed = %config.feed_url, "Loaded configuration");
        Ok(config)
    }

    /// Parses and validates TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "feed_url",
                "bot_name",
                "fetch_timeout_secs",
                "poll_interval_secs",
                "emojis",
                "telegram",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.feed_url)
            .map_err(|e| ConfigError::Invalid(format!("feed_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "feed_url: unsupported scheme {} (only http/https allowed)",
                url.scheme()
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigurationError::ZeroTimeout.into());
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        self.palette()?;
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// The configured palette, or the built-in one when `emojis` is unset.
    pub fn palette(&self) -> Result<EmojiPalette, ConfigurationError> {
        match &self.emojis {
            Some(emojis) => EmojiPalette::new(emojis.clone()),
            None => Ok(EmojiPalette::default()),
        }
    }

    /// Bot token from the environment, falling back to the config file.
    pub fn bot_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.telegram.bot_token.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
