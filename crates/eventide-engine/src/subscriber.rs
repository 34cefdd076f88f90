//! Polling subscriber that drives projections from the event log.
//!
//! Each named subscription owns a cursor over the global event log. On
//! every tick the subscriber selects the next batch of events and hands
//! it to its [`Publisher`]; only after a successful publish does the
//! cursor advance to the last event's id.
//!
//! Delivery is **at-least-once**: a crash between a successful publish
//! and the cursor advance redelivers the same batch on restart, so
//! publishers must be idempotent (safe to re-apply the same batch).
//! Errors are logged and retried on the next tick; no event is ever
//! skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventide_core::{EventRecord, Subscription};
use eventide_store::EventStore;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::EngineError;

/// Default number of events selected per tick.
const DEFAULT_BATCH_LIMIT: usize = 100;

/// Default tick interval.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// External consumer of ordered event batches.
///
/// Implementations update projections or forward events to external
/// systems. `publish` must be idempotent: under at-least-once delivery
/// the same batch can arrive more than once.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The subscription group this publisher consumes under.
    fn name(&self) -> &str;

    /// Apply a batch of events. Returning an error leaves the cursor in
    /// place; the batch is redelivered on a later tick.
    async fn publish(&self, events: &[EventRecord]) -> anyhow::Result<()>;
}

/// Ticker-driven cursor consumer for one named subscription.
pub struct Subscriber {
    store: Arc<dyn EventStore>,
    publisher: Arc<dyn Publisher>,
    subscription: Subscription,
    batch_limit: usize,
    tick_interval: Duration,
}

impl Subscriber {
    /// Create a subscriber for the publisher's subscription group,
    /// inserting the cursor row if it does not exist yet.
    pub async fn new(
        store: Arc<dyn EventStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, EngineError> {
        let subscription = store.insert_subscription(publisher.name()).await?;
        Ok(Self {
            store,
            publisher,
            subscription,
            batch_limit: DEFAULT_BATCH_LIMIT,
            tick_interval: DEFAULT_TICK_INTERVAL,
        })
    }

    /// Set the per-tick batch cap.
    #[must_use]
    pub const fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Set the tick interval.
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Run the tick loop until the shutdown signal fires.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        info!(subscription = %self.subscription.group, "starting subscriber");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(published) if published > 0 => {
                            info!(
                                subscription = %self.subscription.group,
                                published,
                                "processed events"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(
                                subscription = %self.subscription.group,
                                error = %e,
                                "error processing events"
                            );
                        }
                    }
                }
            }
        }
        info!(subscription = %self.subscription.group, "subscriber stopped");
        Ok(())
    }

    /// Select, publish, and (on success) advance the cursor once.
    ///
    /// Returns the number of events published. Exposed so deterministic
    /// tests can drive the subscriber without the timer.
    pub async fn poll_once(&mut self) -> Result<usize, EngineError> {
        let events = self
            .store
            .select_events_for_subscription(&self.subscription, self.batch_limit)
            .await?;
        let Some(last) = events.last() else {
            return Ok(0);
        };

        self.publisher
            .publish(&events)
            .await
            .map_err(|e| EngineError::Publish {
                group: self.subscription.group.clone(),
                message: e.to_string(),
            })?;

        // The cursor advances only after the publisher has acknowledged
        // the batch; a failure in between causes redelivery.
        self.subscription = self
            .store
            .update_subscription(&self.subscription.group, &last.id)
            .await?;
        Ok(events.len())
    }
}
