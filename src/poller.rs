//! Periodic fetch-and-deliver loop.
//!
//! One cycle reads the channel's watermark, fetches items newer than it,
//! broadcasts them in feed order and only then advances the watermark. A cycle
//! that fails anywhere leaves the watermark where it was, so the next tick
//! picks the same items up again (at-least-once delivery).

use crate::delivery::{DeliveryChannel, DeliveryError};
use crate::feed::{FetchError, Feeder};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Delivery failed after {delivered} of {fetched} items: {source}")]
    Delivery {
        fetched: usize,
        delivered: usize,
        #[source]
        source: DeliveryError,
    },
    #[error("Sync state unavailable: {0}")]
    SyncState(#[source] DeliveryError),
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub delivered: usize,
    /// Watermark after the cycle.
    pub watermark: Option<DateTime<Utc>>,
}

/// Runs a single fetch-deliver-sync cycle.
pub async fn run_cycle(
    feeder: &dyn Feeder,
    channel: &dyn DeliveryChannel,
) -> Result<CycleReport, CycleError> {
    let last_synced = channel
        .last_sync_time()
        .await
        .map_err(CycleError::SyncState)?;

    let fetched = feeder.fetch_feed(last_synced).await?;
    let total = fetched.items.len();

    for (delivered, message) in fetched.items.iter().enumerate() {
        if let Err(source) = channel.send_group(message).await {
            return Err(CycleError::Delivery {
                fetched: total,
                delivered,
                source,
            });
        }
    }

    let watermark = match fetched.updated_at {
        Some(updated_at) => {
            channel
                .sync_time(Some(updated_at))
                .await
                .map_err(CycleError::SyncState)?;
            Some(updated_at)
        }
        None => {
            tracing::warn!(
                feed = %feeder.feed_name(),
                "Feed reported no update time, keeping previous watermark"
            );
            last_synced
        }
    };

    Ok(CycleReport {
        fetched: total,
        delivered: total,
        watermark,
    })
}

/// Runs a cycle every `interval` until `shutdown` flips to `true`.
///
/// The first cycle starts immediately. Cycles never overlap: a slow cycle
/// delays the next tick rather than stacking another one behind it.
pub async fn run(
    feeder: &dyn Feeder,
    channel: &dyn DeliveryChannel,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        feed = %feeder.feed_name(),
        interval_secs = interval.as_secs(),
        "Poller started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    tracing::info!("Poller received shutdown signal");
                    break;
                }
            }

            _ = ticker.tick() => {
                match run_cycle(feeder, channel).await {
                    Ok(report) => {
                        if report.delivered > 0 {
                            tracing::info!(
                                delivered = report.delivered,
                                watermark = ?report.watermark,
                                "Delivered new jokes"
                            );
                        } else {
                            tracing::debug!("No new jokes");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Sync cycle failed, will retry next tick");
                    }
                }
            }
        }
    }
}

/// Flips `shutdown` to `true` once `signal` resolves.
///
/// If the signal listener fails, the sender is held open forever and the
/// poller runs until the process is killed.
pub async fn forward_shutdown<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            let _ = shutdown.send(true);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
