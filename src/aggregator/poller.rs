use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::ingest::{scrape_feed, IngestError, IngestReport};
use super::selector::{next_feed, SelectError};
use crate::config::ConfigError;
use crate::feed::FeedClient;
use crate::storage::Database;

/// What the poller is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Waiting for the next tick.
    Idle,
    /// One select-then-ingest cycle in flight.
    Running,
}

/// Totals for one [`Poller::run_until`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub posts_inserted: u64,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Fixed-interval driver for the feed selector and ingestion pipeline.
///
/// Cycles run strictly one after another on the caller's task. Ticks are
/// measured from the previous firing, so a cycle slower than the interval
/// makes the following ticks fire back to back until the schedule catches
/// up.
pub struct Poller {
    db: Database,
    client: FeedClient,
    interval: Duration,
    state: watch::Sender<PollerState>,
    progress: watch::Sender<PollerStats>,
}

impl Poller {
    /// # Errors
    ///
    /// [`ConfigError::NonPositiveInterval`] for a zero interval.
    pub fn new(db: Database, client: FeedClient, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::NonPositiveInterval(format!("{interval:?}")));
        }
        let (state, _) = watch::channel(PollerState::Idle);
        let (progress, _) = watch::channel(PollerStats::default());
        Ok(Self {
            db,
            client,
            interval,
            state,
            progress,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Observe state transitions. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    /// Running totals of the current [`Poller::run_until`] call, published
    /// after every cycle.
    pub fn progress(&self) -> watch::Receiver<PollerStats> {
        self.progress.subscribe()
    }

    /// Select the stalest feed and ingest it once.
    pub async fn run_cycle(&self) -> Result<IngestReport, CycleError> {
        let feed = next_feed(&self.db).await?;
        tracing::debug!(feed_id = feed.id, url = %feed.url, "Selected feed");
        Ok(scrape_feed(&self.db, &self.client, &feed).await?)
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// The first cycle starts immediately. `shutdown` is only polled between
    /// cycles, so a cycle that has started always completes. Cycle errors are
    /// logged and counted; they never end the loop.
    pub async fn run_until<F>(&self, shutdown: F) -> PollerStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut stats = PollerStats::default();
        self.progress.send_replace(stats);

        tracing::info!(interval = ?self.interval, "Collecting feeds");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping poller");
                    break;
                }
                _ = ticker.tick() => {}
            }

            self.state.send_replace(PollerState::Running);
            let outcome = self.run_cycle().await;
            self.state.send_replace(PollerState::Idle);

            stats.cycles += 1;
            match outcome {
                Ok(report) => stats.posts_inserted += report.inserted as u64,
                Err(e) => {
                    stats.failed_cycles += 1;
                    log_cycle_error(&e);
                }
            }
            self.progress.send_replace(stats);
        }

        tracing::info!(
            cycles = stats.cycles,
            failed = stats.failed_cycles,
            inserted = stats.posts_inserted,
            "Poller stopped"
        );
        stats
    }
}

fn log_cycle_error(err: &CycleError) {
    match err {
        CycleError::Select(SelectError::NoFeeds) => {
            tracing::warn!(error = %err, "Nothing to collect");
        }
        CycleError::Ingest(IngestError::Source { .. }) => {
            tracing::warn!(error = %err, "Feed fetch failed");
        }
        CycleError::Select(SelectError::Store(_)) | CycleError::Ingest(IngestError::Store { .. }) => {
            tracing::error!(error = %err, "Cycle failed");
        }
    }
}
