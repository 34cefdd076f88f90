//! The partitioned concurrent command processor.
//!
//! On a fixed tick the processor selects a bounded batch of pending
//! commands, partitioned into lanes by `aggregate_hash mod workers`. All
//! commands for a given aggregate always land in the same lane, which
//! guarantees per-aggregate ordering without cross-aggregate contention:
//! lanes execute fully concurrently while each lane executes strictly
//! sequentially, and every lane finishes before the next tick is
//! eligible.
//!
//! Per command, inside one lane:
//!
//! 1. fetch (or lazily create) the aggregate's expected version
//! 2. reconstruct the typed command via the registry -- unknown types and
//!    undecodable payloads are reported and the command abandoned
//! 3. run the domain handler with replay-on-demand aggregate loading
//! 4. a handler error (or panic, which is caught) becomes a durable
//!    `EventError` at the next version slot -- the stream stays contiguous
//! 5. version-stamp the resulting events `expected+1 ..` and persist them
//!    together with the version compare-and-swap and the status flip; a
//!    conflict rolls back and leaves the command pending for a later tick
//!
//! The worker count is fixed at construction and never changes while the
//! processor lives; lane affinity is what keeps the expected-version read
//! and the compare-and-swap safe without a lock.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use eventide_core::{
    AggregateLoader, AggregateRoot, CommandContext, CommandRecord, Event, EventError,
    Registry, event_to_record, load, records_to_envelopes, time_ordered_id,
};
use eventide_core::{CoreError, EventRecord};
use eventide_store::{EventStore, StoreError};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;

/// Default per-lane batch cap per tick.
const DEFAULT_BATCH_LIMIT: usize = 10;

/// Default tick interval.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// The partitioned concurrent command processor.
///
/// Cheap to clone; clones share the store and registry.
#[derive(Clone)]
pub struct CommandProcessor {
    store: Arc<dyn EventStore>,
    registry: Arc<Registry>,
    domain: Arc<str>,
    workers: usize,
    batch_limit: usize,
    tick_interval: Duration,
}

impl CommandProcessor {
    /// Create a processor with `workers` lanes over the given store and
    /// registry.
    pub fn new(
        workers: usize,
        store: Arc<dyn EventStore>,
        registry: Arc<Registry>,
        domain: &str,
    ) -> Self {
        Self {
            store,
            registry,
            domain: Arc::from(domain),
            workers: workers.max(1),
            batch_limit: DEFAULT_BATCH_LIMIT,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Set the per-lane batch cap per tick.
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
    ///
    /// Tick failures are logged and the loop continues; only shutdown
    /// ends it.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        info!(domain = %self.domain, workers = self.workers, "starting command processor");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "failed to process commands");
                    }
                }
            }
        }
        info!(domain = %self.domain, "command processor stopped");
        Ok(())
    }

    /// Execute a single tick: select, partition, run all lanes, fan in.
    ///
    /// Exposed so deterministic tests and batch jobs can drive the
    /// processor without the timer.
    pub async fn run_once(&self) -> Result<(), EngineError> {
        let started = Instant::now();
        let lanes = self
            .store
            .select_for_processing(self.workers, self.batch_limit)
            .await?;
        let select_duration = started.elapsed();
        let total: usize = lanes.iter().map(Vec::len).sum();
        if total == 0 {
            return Ok(());
        }

        let mut join_set: JoinSet<Result<(), EngineError>> = JoinSet::new();
        for (lane_index, lane) in lanes.into_iter().enumerate() {
            if lane.is_empty() {
                continue;
            }
            let processor = self.clone();
            join_set.spawn(async move { processor.process_lane(lane_index, lane).await });
        }

        // All lanes must finish before the next tick is eligible; the
        // first failure is reported after the fan-in completes.
        let mut first_error: Option<EngineError> = None;
        while let Some(joined) = join_set.join_next().await {
            let result = joined.unwrap_or_else(|join_error| {
                Err(EngineError::Task {
                    name: "lane".to_owned(),
                    message: join_error.to_string(),
                })
            });
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        let total_duration = started.elapsed();
        let speed = f64::from(u32::try_from(total).unwrap_or(u32::MAX))
            / total_duration.as_secs_f64().max(f64::EPSILON);
        debug!(total, ?select_duration, ?total_duration, speed, "processed commands");
        first_error.map_or(Ok(()), Err)
    }

    /// Process one lane strictly sequentially.
    async fn process_lane(
        &self,
        lane: usize,
        records: Vec<CommandRecord>,
    ) -> Result<(), EngineError> {
        for record in records {
            if let Err(e) = self.process_one(&record).await {
                match e {
                    // A conflict means another writer advanced the
                    // aggregate; the command stays pending and this
                    // lane's remaining commands wait for the next tick
                    // so per-aggregate order is preserved.
                    EngineError::Store(StoreError::WrongExpectedVersion) => {
                        warn!(
                            lane,
                            command_id = %record.id,
                            aggregate_id = %record.aggregate_id,
                            "version conflict, leaving lane for a later tick"
                        );
                        return Ok(());
                    }
                    other => return Err(other),
                }
            }
        }
        Ok(())
    }

    /// Process a single command record.
    async fn process_one(&self, record: &CommandRecord) -> Result<(), EngineError> {
        let Some(ctor) = self.registry.command(&record.event_type) else {
            error!(
                command_id = %record.id,
                event_type = %record.event_type,
                "no constructor for command type, abandoning command"
            );
            return Ok(());
        };

        let expected_version = self.store.get_or_create_version(&record.aggregate_id).await?;

        let command = match ctor(&record.data) {
            Ok(command) => command,
            Err(e) => {
                error!(
                    command_id = %record.id,
                    event_type = %record.event_type,
                    error = %e,
                    "failed to reconstruct command, abandoning command"
                );
                return Ok(());
            }
        };

        let ctx = CommandContext {
            command_id: &record.id,
            aggregate_id: &record.aggregate_id,
            loader: self,
        };

        // Handler failures never propagate to the dispatcher: they are
        // captured as a durable EventError at the next version slot, so
        // the aggregate's version history shows the failure without
        // breaking stream contiguity. Panics are caught the same way.
        let outcome = AssertUnwindSafe(command.handle(&ctx)).catch_unwind().await;
        let events: Vec<Box<dyn Event>> = match outcome {
            Ok(Ok(events)) => events,
            Ok(Err(handler_error)) => {
                warn!(
                    command_id = %record.id,
                    aggregate_id = %record.aggregate_id,
                    error = %handler_error,
                    "command handler failed, recording EventError"
                );
                vec![Box::new(EventError::new(handler_error.to_string()))]
            }
            Err(panic) => {
                let message = panic_message(&panic);
                error!(
                    command_id = %record.id,
                    aggregate_id = %record.aggregate_id,
                    panic = %message,
                    "command handler panicked, recording EventError"
                );
                vec![Box::new(EventError::new(message))]
            }
        };

        let mut event_records: Vec<EventRecord> = Vec::with_capacity(events.len());
        for (offset, event) in events.iter().enumerate() {
            let version = expected_version
                .saturating_add(1)
                .saturating_add(u64::try_from(offset).unwrap_or(u64::MAX));
            event_records.push(event_to_record(
                event.as_ref(),
                time_ordered_id(),
                &record.id,
                &record.aggregate_id,
                version,
            )?);
        }

        self.store
            .store_command_results(&record.id, expected_version, &event_records)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AggregateLoader for CommandProcessor {
    /// Replay-on-demand: load and fold the aggregate's full event stream.
    async fn load(
        &self,
        aggregate_id: &str,
        aggregate: &mut dyn AggregateRoot,
    ) -> anyhow::Result<()> {
        if aggregate_id.is_empty() {
            return Err(CoreError::NilAggregate.into());
        }
        let records = self.store.load_events(aggregate_id).await?;
        let envelopes = records_to_envelopes(&self.registry, &records)?;
        load(aggregate, &envelopes)?;
        if aggregate.base().id.is_empty() {
            aggregate.base_mut().id = aggregate_id.to_owned();
        }
        Ok(())
    }
}

/// Extract a human-readable message from a caught panic payload.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "command handler panicked".to_owned()
    }
}
