//! The event/command store contract.

use async_trait::async_trait;
use eventide_core::{CommandRecord, EventRecord, Subscription};

use crate::error::StoreError;

/// Persistence contract for the command queue, the event log, aggregate
/// versions, and subscription cursors.
///
/// Implementations must provide:
///
/// - **Idempotent producer retries**: [`EventStore::save_command_records`]
///   silently ignores duplicate ids and returns only the ids actually
///   persisted.
/// - **Lane partitioning**: [`EventStore::select_for_processing`] returns
///   `workers` batches partitioned by `aggregate_hash mod workers`, each
///   internally ordered by command id, so all commands of one aggregate
///   always land in the same batch.
/// - **Atomic result storage**: [`EventStore::store_command_results`]
///   commits the version compare-and-swap, the event inserts, and the
///   command status flip in one transaction, or none of them.
/// - **Replay hygiene**: [`EventStore::load_events`] and
///   [`EventStore::select_events_for_subscription`] exclude `EventError`
///   records and order by `(id, version)`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Run idempotent schema setup.
    async fn migrate(&self) -> Result<(), StoreError>;

    /// Bulk-insert command records, ignoring duplicate ids.
    ///
    /// Returns the ids that were actually persisted; retried producers
    /// see their duplicates dropped silently.
    async fn save_command_records(
        &self,
        records: &[CommandRecord],
    ) -> Result<Vec<String>, StoreError>;

    /// Fetch a single command record by id.
    async fn get_command(&self, command_id: &str) -> Result<CommandRecord, StoreError>;

    /// Atomically persist a command's results.
    ///
    /// With events: performs the version compare-and-swap
    /// (`version = version + n WHERE version = expected_version`), inserts
    /// the events, and marks the command finished -- all in one
    /// transaction. Zero rows matched by the swap means another writer
    /// advanced the aggregate: the transaction rolls back and
    /// [`StoreError::WrongExpectedVersion`] is returned, leaving the
    /// command pending.
    ///
    /// With no events: no version check, the command is simply marked
    /// finished.
    async fn store_command_results(
        &self,
        command_id: &str,
        expected_version: u64,
        events: &[EventRecord],
    ) -> Result<(), StoreError>;

    /// Select pending commands partitioned into `workers` ordered lanes.
    ///
    /// Lane `i` holds at most `limit_per_worker` commands with
    /// `aggregate_hash mod workers == i`, ordered by id.
    async fn select_for_processing(
        &self,
        workers: usize,
        limit_per_worker: usize,
    ) -> Result<Vec<Vec<CommandRecord>>, StoreError>;

    /// Fetch the aggregate's current version, creating the row at 0 on
    /// first access. Idempotent.
    async fn get_or_create_version(&self, aggregate_id: &str) -> Result<u64, StoreError>;

    /// Create the cursor for a named subscription if absent, returning
    /// its current state either way.
    async fn insert_subscription(&self, group: &str) -> Result<Subscription, StoreError>;

    /// Select events after the subscription's cursor, excluding
    /// `EventError` records, ordered by `(id, version)`, capped at
    /// `limit`.
    async fn select_events_for_subscription(
        &self,
        subscription: &Subscription,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError>;

    /// Advance the subscription cursor to `last_seen_event_id`.
    async fn update_subscription(
        &self,
        group: &str,
        last_seen_event_id: &str,
    ) -> Result<Subscription, StoreError>;

    /// Load the aggregate's full ordered stream for replay, excluding
    /// `EventError` records.
    async fn load_events(&self, aggregate_id: &str) -> Result<Vec<EventRecord>, StoreError>;
}
