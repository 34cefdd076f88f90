//! Consumer instances and the consumer group runner.
//!
//! A [`Consumer`] owns one transport and processes its assigned
//! partitions strictly sequentially. Offset handling follows the broker
//! contract:
//!
//! - on partition **assignment** the per-consumer offset state resets
//! - on **revocation** pending offsets are committed synchronously before
//!   the partitions are released, preventing duplicate processing across
//!   rebalances
//! - offsets are committed in batches every
//!   [`ConsumerConfig::commit_interval`] messages and flushed on shutdown
//!
//! Message failures apply exponential backoff (starting small, doubling,
//! capped) and block that partition until success or cancellation --
//! deliberate backpressure rather than dropping messages. Worker panics
//! are caught and retried like ordinary errors. Transport failures are
//! fatal to the consumer instance.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::BusError;
use crate::transport::{BusConsumer, ConsumerEvent, IncomingMessage, PartitionId};
use crate::worker::Worker;

/// Tuning knobs for a consumer instance.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Commit after this many processed messages.
    pub commit_interval: usize,
    /// How long a single poll waits for an event.
    pub poll_timeout: Duration,
    /// First retry delay after a worker failure.
    pub initial_backoff: Duration,
    /// Retry delay cap.
    pub max_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            commit_interval: 10,
            poll_timeout: Duration::from_millis(100),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// One consumer instance over one transport.
pub struct Consumer<C: BusConsumer> {
    transport: C,
    worker: Arc<dyn Worker>,
    config: ConsumerConfig,
    /// Next-read offset per partition, pending commit.
    offsets: HashMap<PartitionId, u64>,
    processed_since_commit: usize,
}

impl<C: BusConsumer> Consumer<C> {
    /// Create a consumer with default configuration.
    pub fn new(transport: C, worker: Arc<dyn Worker>) -> Self {
        Self::with_config(transport, worker, ConsumerConfig::default())
    }

    /// Create a consumer with explicit configuration.
    pub fn with_config(transport: C, worker: Arc<dyn Worker>, config: ConsumerConfig) -> Self {
        Self {
            transport,
            worker,
            config,
            offsets: HashMap::new(),
            processed_since_commit: 0,
        }
    }

    /// Poll, process, and commit until the shutdown signal fires.
    ///
    /// Pending offsets are flushed before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), BusError> {
        info!("starting bus consumer");
        loop {
            let poll_timeout = self.config.poll_timeout;
            tokio::select! {
                _ = shutdown.changed() => break,
                event = self.transport.next_event(poll_timeout) => {
                    match event? {
                        None => {}
                        Some(ConsumerEvent::Assigned(partitions)) => {
                            info!(?partitions, "partitions assigned");
                            self.offsets.clear();
                            self.processed_since_commit = 0;
                        }
                        Some(ConsumerEvent::Revoked(partitions)) => {
                            info!(?partitions, "partitions revoked, committing offsets");
                            self.commit_pending().await?;
                        }
                        Some(ConsumerEvent::Message(incoming)) => {
                            if !self.handle_message(&incoming, &mut shutdown).await {
                                break;
                            }
                            self.offsets
                                .insert(incoming.partition, incoming.offset.saturating_add(1));
                            self.processed_since_commit =
                                self.processed_since_commit.saturating_add(1);
                            if self.processed_since_commit >= self.config.commit_interval {
                                self.commit_pending().await?;
                            }
                        }
                    }
                }
            }
        }
        // Drain pending offset commits before closing.
        self.commit_pending().await?;
        info!("bus consumer stopped");
        Ok(())
    }

    /// Process one message, retrying with capped exponential backoff
    /// until it succeeds or shutdown fires. Returns `false` on shutdown.
    async fn handle_message(
        &self,
        incoming: &IncomingMessage,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut backoff = self.config.initial_backoff;
        loop {
            let outcome =
                AssertUnwindSafe(self.worker.process(&incoming.message)).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => {
                    warn!(
                        partition = incoming.partition,
                        offset = incoming.offset,
                        error = %e,
                        ?backoff,
                        "message processing failed, backing off"
                    );
                }
                Err(_panic) => {
                    error!(
                        partition = incoming.partition,
                        offset = incoming.offset,
                        ?backoff,
                        "message worker panicked, backing off"
                    );
                }
            }
            // Backpressure: this partition stays blocked until the
            // message goes through or we are told to stop.
            tokio::select! {
                _ = shutdown.changed() => return false,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = backoff.saturating_mul(2).min(self.config.max_backoff);
        }
    }

    /// Commit the tracked next-read offsets, if any.
    async fn commit_pending(&mut self) -> Result<(), BusError> {
        if self.offsets.is_empty() {
            return Ok(());
        }
        self.transport.commit(&self.offsets).await?;
        self.processed_since_commit = 0;
        Ok(())
    }
}

/// Run `consumers` transports as one consumer group sharing a worker.
///
/// Each instance runs on its own task; the first transport failure stops
/// the group and is returned. Instances exit cleanly on shutdown, each
/// flushing its pending offset commits.
pub async fn run_consumer_group<C>(
    transports: Vec<C>,
    worker: Arc<dyn Worker>,
    config: ConsumerConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<(), BusError>
where
    C: BusConsumer + Send + Sync + 'static,
{
    let mut join_set: JoinSet<Result<(), BusError>> = JoinSet::new();
    for transport in transports {
        let consumer = Consumer::with_config(transport, Arc::clone(&worker), config.clone());
        let rx = shutdown.clone();
        join_set.spawn(async move { consumer.run(rx).await });
    }

    let mut first_error: Option<BusError> = None;
    while let Some(joined) = join_set.join_next().await {
        let result = joined
            .unwrap_or_else(|join_error| Err(BusError::Transport(join_error.to_string())));
        if let Err(e) = result {
            error!(error = %e, "consumer instance failed");
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}
