//! Integration tests for the fetch -> deliver -> sync cycle.
//!
//! Each test serves a feed from its own wiremock server and records what the
//! poller hands to the delivery channel, so the watermark rules can be checked
//! end-to-end without a real chat backend.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jokebot::delivery::{DeliveryChannel, DeliveryError, TelegramChannel, TelegramConfig};
use jokebot::feed::{EmojiPalette, JokesFeed};
use jokebot::poller::{forward_shutdown, run, run_cycle, CycleError};
use secrecy::SecretString;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, min, 0).unwrap()
}

/// Records group messages and watermark writes. Fails `send_group` from the
/// `fail_from`-th call onwards when set.
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<String>>,
    sync_calls: Mutex<Vec<Option<DateTime<Utc>>>>,
    watermark: Mutex<Option<DateTime<Utc>>>,
    fail_from: Option<usize>,
}

impl RecordingChannel {
    fn with_watermark(watermark: DateTime<Utc>) -> Self {
        Self {
            watermark: Mutex::new(Some(watermark)),
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn sync_calls(&self) -> Vec<Option<DateTime<Utc>>> {
        self.sync_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, message: &str, _chat_id: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn greet(&self, _chat_id: &str) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_group(&self, message: &str) -> Result<(), DeliveryError> {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_from.is_some_and(|n| sent.len() >= n) {
            return Err(DeliveryError::Partial {
                delivered: 0,
                total: 1,
            });
        }
        sent.push(message.to_string());
        Ok(())
    }

    async fn apologize(&self, _chat_id: &str) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn sync_time(&self, new_fetched_at: Option<DateTime<Utc>>) -> Result<(), DeliveryError> {
        self.sync_calls.lock().unwrap().push(new_fetched_at);
        if new_fetched_at.is_some() {
            *self.watermark.lock().unwrap() = new_fetched_at;
        }
        Ok(())
    }

    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, DeliveryError> {
        Ok(*self.watermark.lock().unwrap())
    }
}

fn jokes_atom(updated: &str, entries: &[(&str, &str)]) -> String {
    let entries: String = entries
        .iter()
        .enumerate()
        .map(|(i, (title, ts))| {
            format!(
                r#"<entry><id>t3_{i}</id><title>{title}</title><updated>{ts}</updated><content type="html">&lt;p&gt;{title} body&lt;/p&gt; submitted by &lt;a href=&quot;u&quot;&gt; /u/someone &lt;/a&gt; &lt;a href=&quot;l&quot;&gt;[link]&lt;/a&gt; &lt;a href=&quot;c&quot;&gt;[comments]&lt;/a&gt;</content></entry>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><id>/r/Jokes/.rss</id><title>Jokes</title><updated>{updated}</updated>{entries}</feed>"#
    )
}

async fn serve(body: String, delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("Content-Type", "application/atom+xml")
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

fn feed_for(server: &MockServer, timeout: Duration) -> JokesFeed {
    JokesFeed::new(
        reqwest::Client::new(),
        format!("{}/r/Jokes/.rss", server.uri()),
        "CycleBot",
        timeout,
        EmojiPalette::new(vec!["😂".to_string()]).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_cycle_delivers_only_new_items_and_advances_watermark() {
    let body = jokes_atom(
        "2024-01-01T10:15:00Z",
        &[
            ("Old", "2024-01-01T10:00:00Z"),
            ("Boundary", "2024-01-01T10:05:00Z"),
            ("Fresh", "2024-01-01T10:10:00Z"),
        ],
    );
    let server = serve(body, Duration::ZERO).await;
    let feed = feed_for(&server, Duration::from_secs(5));
    let channel = RecordingChannel::with_watermark(at(10, 5));

    let report = run_cycle(&feed, &channel).await.unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.watermark, Some(at(10, 15)));

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("😂 😂 😂 😂\n\nFresh\n\nFresh body"));
    assert!(sent[0].contains("\n\nsubmitted by: "));
    assert!(!sent[0].contains("[link]"));
    assert!(!sent[0].contains("[comments"));
    assert!(sent[0].ends_with("😂 😂 😂 😂\n\nby CycleBot"));

    assert_eq!(channel.sync_calls(), vec![Some(at(10, 15))]);
}

#[tokio::test]
async fn test_second_cycle_delivers_nothing() {
    let body = jokes_atom("2024-01-01T10:15:00Z", &[("Only", "2024-01-01T10:10:00Z")]);
    let server = serve(body, Duration::ZERO).await;
    let feed = feed_for(&server, Duration::from_secs(5));
    let channel = RecordingChannel::default();

    let first = run_cycle(&feed, &channel).await.unwrap();
    assert_eq!(first.delivered, 1);

    let second = run_cycle(&feed, &channel).await.unwrap();
    assert_eq!(second.delivered, 0);
    assert_eq!(second.watermark, Some(at(10, 15)));
    assert_eq!(channel.sent().len(), 1);
}

#[tokio::test]
async fn test_empty_feed_is_not_an_error() {
    let body = jokes_atom("2024-01-01T10:15:00Z", &[]);
    let server = serve(body, Duration::ZERO).await;
    let feed = feed_for(&server, Duration::from_secs(5));
    let channel = RecordingChannel::with_watermark(at(9, 0));

    let report = run_cycle(&feed, &channel).await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.watermark, Some(at(10, 15)));
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn test_fetch_timeout_sends_nothing_and_keeps_watermark() {
    let body = jokes_atom("2024-01-01T10:15:00Z", &[("Late", "2024-01-01T10:10:00Z")]);
    let server = serve(body, Duration::from_secs(2)).await;
    let feed = feed_for(&server, Duration::from_millis(100));
    let channel = RecordingChannel::with_watermark(at(10, 0));

    let err = run_cycle(&feed, &channel).await.unwrap_err();
    assert!(matches!(err, CycleError::Fetch(_)));
    assert!(channel.sent().is_empty());
    assert!(channel.sync_calls().is_empty());
    assert_eq!(channel.last_sync_time().await.unwrap(), Some(at(10, 0)));
}

#[tokio::test]
async fn test_delivery_failure_holds_watermark() {
    let body = jokes_atom(
        "2024-01-01T10:15:00Z",
        &[
            ("One", "2024-01-01T10:01:00Z"),
            ("Two", "2024-01-01T10:02:00Z"),
            ("Three", "2024-01-01T10:03:00Z"),
        ],
    );
    let server = serve(body, Duration::ZERO).await;
    let feed = feed_for(&server, Duration::from_secs(5));
    let channel = RecordingChannel {
        fail_from: Some(1),
        ..Default::default()
    };

    let err = run_cycle(&feed, &channel).await.unwrap_err();
    match err {
        CycleError::Delivery {
            fetched, delivered, ..
        } => {
            assert_eq!(fetched, 3);
            assert_eq!(delivered, 1);
        }
        e => panic!("Expected Delivery error, got {:?}", e),
    }
    assert!(channel.sync_calls().is_empty());
    assert_eq!(channel.last_sync_time().await.unwrap(), None);
}

#[tokio::test]
async fn test_feed_without_update_time_keeps_previous_watermark() {
    let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Jokes</title>
    <item><guid>1</guid><title>Undated</title><description>Body</description></item>
</channel></rss>"#;
    let server = serve(rss.to_string(), Duration::ZERO).await;
    let feed = feed_for(&server, Duration::from_secs(5));
    let channel = RecordingChannel::default();

    let report = run_cycle(&feed, &channel).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.watermark, None);
    assert!(channel.sync_calls().is_empty());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let body = jokes_atom("2024-01-01T10:15:00Z", &[("Only", "2024-01-01T10:10:00Z")]);
    let server = serve(body, Duration::ZERO).await;
    let feed = feed_for(&server, Duration::from_secs(5));
    let channel = RecordingChannel::default();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let stopper = async {
        // Give the immediate first tick time to complete one cycle.
        while channel.sync_calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
    };

    tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(
            run(&feed, &channel, Duration::from_secs(3600), shutdown_rx),
            stopper
        );
    })
    .await
    .expect("poller did not stop after shutdown");

    assert_eq!(channel.sent().len(), 1);
}

#[tokio::test]
async fn test_kicked_group_does_not_cause_duplicates() {
    let body = jokes_atom("2024-01-01T10:15:00Z", &[("Only", "2024-01-01T10:10:00Z")]);
    let feed_server = serve(body, Duration::ZERO).await;
    let feed = feed_for(&feed_server, Duration::from_secs(5));

    let telegram = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({ "chat_id": "kicked" })))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was kicked from the group chat"
        })))
        .mount(&telegram)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": { "message_id": 1 }
        })))
        .mount(&telegram)
        .await;

    let channel = TelegramChannel::new(
        reqwest::Client::new(),
        TelegramConfig {
            bot_token: SecretString::from("123:token".to_string()),
            api_base_url: telegram.uri(),
            group_chat_ids: vec!["healthy".to_string(), "kicked".to_string()],
        },
        "CycleBot",
    );

    let first = run_cycle(&feed, &channel).await.unwrap();
    assert_eq!(first.delivered, 1);
    assert_eq!(first.watermark, Some(at(10, 15)));

    let second = run_cycle(&feed, &channel).await.unwrap();
    assert_eq!(second.delivered, 0);

    let healthy_deliveries = telegram
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            body["chat_id"] == "healthy"
        })
        .count();
    assert_eq!(healthy_deliveries, 1);
}

#[tokio::test]
async fn test_signal_flips_shutdown() {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_shutdown(async { Ok::<(), std::io::Error>(()) }, shutdown_tx));

    shutdown_rx.changed().await.unwrap();
    assert!(*shutdown_rx.borrow());
}

#[tokio::test]
async fn test_failed_signal_listener_keeps_shutdown_open() {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_shutdown(
        async { Err::<(), _>(std::io::Error::other("signal handler unavailable")) },
        shutdown_tx,
    ));

    let changed = tokio::time::timeout(Duration::from_millis(200), shutdown_rx.changed()).await;
    assert!(changed.is_err(), "shutdown channel closed or flipped");
    assert!(!*shutdown_rx.borrow());
}
