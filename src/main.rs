use anyhow::{Context, Result};
use clap::Parser;
use jokebot::config::Config;
use jokebot::delivery::{ConsoleChannel, DeliveryChannel, TelegramChannel, TelegramConfig};
use jokebot::feed::{Feeder, JokesFeed};
use jokebot::poller;
use secrecy::SecretString;
use std::path::PathBuf;
use tokio::sync::watch;

const USER_AGENT: &str = concat!("jokebot/", env!("CARGO_PKG_VERSION"));

/// Get the default config file path (~/.config/jokebot/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("jokebot")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "jokebot", about = "Relays subreddit jokes to a Telegram chat")]
struct Args {
    /// Config file (defaults to ~/.config/jokebot/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single sync cycle and exit
    #[arg(long)]
    once: bool,

    /// Print messages to stdout instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Print every item currently in the feed, ignoring sync state, and exit
    #[arg(long)]
    all: bool,

    /// Send the greeting to this chat on startup
    #[arg(long, value_name = "CHAT_ID")]
    greet: Option<String>,
}

fn build_channel(
    config: &Config,
    client: reqwest::Client,
    dry_run: bool,
) -> Result<Box<dyn DeliveryChannel>> {
    if dry_run {
        return Ok(Box::new(ConsoleChannel::stdout(&config.bot_name)));
    }

    let token = config.bot_token().with_context(|| {
        format!(
            "No Telegram bot token: set {} or telegram.bot_token (or use --dry-run)",
            jokebot::config::TOKEN_ENV_VAR
        )
    })?;

    if config.telegram.group_chat_ids.is_empty() {
        tracing::warn!("No telegram.group_chat_ids configured; every delivery will fail");
    }

    Ok(Box::new(TelegramChannel::new(
        client,
        TelegramConfig {
            bot_token: SecretString::from(token),
            api_base_url: config.telegram.api_base_url.clone(),
            group_chat_ids: config.telegram.group_chat_ids.clone(),
        },
        &config.bot_name,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; RUST_LOG controls verbosity
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;

    let palette = config.palette().context("Invalid emoji palette")?;
    let feed = JokesFeed::new(
        client.clone(),
        &config.feed_url,
        &config.bot_name,
        config.fetch_timeout(),
        palette,
    )
    .context("Invalid feed configuration")?;

    if args.all {
        let fetched = feed
            .fetch_feed_unsync()
            .await
            .context("Failed to fetch feed")?;
        for message in &fetched.items {
            println!("{message}\n");
        }
        return Ok(());
    }

    let channel = build_channel(&config, client, args.dry_run)?;

    if let Some(chat_id) = &args.greet {
        if let Err(e) = channel.greet(chat_id).await {
            tracing::warn!(chat_id = %chat_id, error = %e, "Failed to send greeting");
        }
    }

    if args.once {
        let report = poller::run_cycle(&feed, channel.as_ref())
            .await
            .context("Sync cycle failed")?;
        println!(
            "Delivered {} of {} new jokes from {}",
            report.delivered,
            report.fetched,
            feed.feed_name()
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(poller::forward_shutdown(
        tokio::signal::ctrl_c(),
        shutdown_tx,
    ));

    poller::run(&feed, channel.as_ref(), config.poll_interval(), shutdown_rx).await;

    println!("Goodbye!");
    Ok(())
}
