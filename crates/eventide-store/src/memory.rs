//! In-process event/command store.
//!
//! Implements the full [`EventStore`] contract -- idempotent command
//! saves, lane partitioning, the version compare-and-swap, subscription
//! cursors, and `EventError` exclusion -- against in-memory maps behind a
//! mutex. Processor and subscriber tests (and examples) run against it
//! without a live database; the lock makes every operation atomic the way
//! a transaction does in the relational store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use eventide_core::{
    CommandRecord, EVENT_ERROR_TYPE, EventRecord, STATUS_FINISHED, Subscription,
};

use crate::error::StoreError;
use crate::store::EventStore;

#[derive(Default)]
struct Inner {
    /// Command records keyed by id; `BTreeMap` keeps insertion-order
    /// iteration (ids are time-sortable).
    commands: BTreeMap<String, CommandRecord>,
    /// The global event log keyed by event id.
    events: BTreeMap<String, EventRecord>,
    /// One version anchor per aggregate.
    versions: HashMap<String, u64>,
    /// One cursor per subscription group.
    subscriptions: HashMap<String, Subscription>,
}

/// In-memory [`EventStore`] with relational-store semantics.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn migrate(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn save_command_records(
        &self,
        records: &[CommandRecord],
    ) -> Result<Vec<String>, StoreError> {
        let mut inner = self.lock();
        let mut saved = Vec::new();
        for record in records {
            if inner.commands.contains_key(&record.id) {
                continue;
            }
            inner.commands.insert(record.id.clone(), record.clone());
            saved.push(record.id.clone());
        }
        Ok(saved)
    }

    async fn get_command(&self, command_id: &str) -> Result<CommandRecord, StoreError> {
        self.lock()
            .commands
            .get(command_id)
            .cloned()
            .ok_or_else(|| StoreError::CommandNotFound(command_id.to_owned()))
    }

    async fn store_command_results(
        &self,
        command_id: &str,
        expected_version: u64,
        events: &[EventRecord],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();

        if let Some(first) = events.first() {
            let count = u64::try_from(events.len()).unwrap_or(u64::MAX);
            match inner.versions.get_mut(&first.aggregate_id) {
                Some(version) if *version == expected_version => {
                    *version = version.saturating_add(count);
                }
                // No matching row: the swap affects nothing and the whole
                // write is abandoned, mirroring the transactional rollback.
                _ => return Err(StoreError::WrongExpectedVersion),
            }
            for event in events {
                inner.events.insert(event.id.clone(), event.clone());
            }
        }

        if let Some(command) = inner.commands.get_mut(command_id) {
            command.status = Some(STATUS_FINISHED.to_owned());
        }
        Ok(())
    }

    async fn select_for_processing(
        &self,
        workers: usize,
        limit_per_worker: usize,
    ) -> Result<Vec<Vec<CommandRecord>>, StoreError> {
        let mut lanes: Vec<Vec<CommandRecord>> = vec![Vec::new(); workers];
        if workers == 0 {
            return Ok(lanes);
        }
        let worker_count = i32::try_from(workers).unwrap_or(i32::MAX);
        let inner = self.lock();
        for record in inner.commands.values() {
            if !record.is_pending() {
                continue;
            }
            let lane = usize::try_from(record.aggregate_hash.rem_euclid(worker_count))
                .unwrap_or(0);
            if let Some(bucket) = lanes.get_mut(lane) {
                if bucket.len() < limit_per_worker {
                    bucket.push(record.clone());
                }
            }
        }
        Ok(lanes)
    }

    async fn get_or_create_version(&self, aggregate_id: &str) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        Ok(*inner.versions.entry(aggregate_id.to_owned()).or_insert(0))
    }

    async fn insert_subscription(&self, group: &str) -> Result<Subscription, StoreError> {
        let mut inner = self.lock();
        let subscription = inner
            .subscriptions
            .entry(group.to_owned())
            .or_insert_with(|| Subscription {
                group: group.to_owned(),
                last_seen_event_id: String::new(),
                last_updated_at: Utc::now(),
            });
        Ok(subscription.clone())
    }

    async fn select_events_for_subscription(
        &self,
        subscription: &Subscription,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let inner = self.lock();
        // Read the stored cursor, not the caller's copy, like the
        // relational implementation does.
        let Some(stored) = inner.subscriptions.get(&subscription.group) else {
            return Ok(Vec::new());
        };
        let cursor = stored.last_seen_event_id.clone();
        Ok(inner
            .events
            .values()
            .filter(|event| event.id > cursor && event.event_type != EVENT_ERROR_TYPE)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_subscription(
        &self,
        group: &str,
        last_seen_event_id: &str,
    ) -> Result<Subscription, StoreError> {
        let mut inner = self.lock();
        let subscription = inner
            .subscriptions
            .get_mut(group)
            .ok_or_else(|| StoreError::SubscriptionNotFound(group.to_owned()))?;
        subscription.last_seen_event_id = last_seen_event_id.to_owned();
        subscription.last_updated_at = Utc::now();
        Ok(subscription.clone())
    }

    async fn load_events(&self, aggregate_id: &str) -> Result<Vec<EventRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .events
            .values()
            .filter(|event| {
                event.aggregate_id == aggregate_id && event.event_type != EVENT_ERROR_TYPE
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use eventide_core::{partition_hash, time_ordered_id};

    use super::*;

    fn command(aggregate_id: &str) -> CommandRecord {
        CommandRecord {
            id: time_ordered_id(),
            aggregate_id: aggregate_id.to_owned(),
            event_type: "Create".to_owned(),
            data: serde_json::json!({}),
            created_at: Utc::now(),
            aggregate_hash: partition_hash(aggregate_id),
            status: None,
        }
    }

    fn event(aggregate_id: &str, command_id: &str, version: u64) -> EventRecord {
        EventRecord {
            id: time_ordered_id(),
            command_id: command_id.to_owned(),
            aggregate_id: aggregate_id.to_owned(),
            event_type: "Created".to_owned(),
            version,
            data: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_command_ids_are_ignored() {
        let store = MemoryStore::new();
        let record = command("todo-1");
        let first = store.save_command_records(&[record.clone()]).await.unwrap();
        assert_eq!(first, vec![record.id.clone()]);
        let second = store.save_command_records(&[record]).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn versions_start_at_zero_and_are_idempotent() {
        let store = MemoryStore::new();
        assert_eq!(store.get_or_create_version("todo-1").await.unwrap(), 0);
        assert_eq!(store.get_or_create_version("todo-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_results_advances_version_and_finishes_command() {
        let store = MemoryStore::new();
        let cmd = command("todo-1");
        store.save_command_records(std::slice::from_ref(&cmd)).await.unwrap();
        store.get_or_create_version("todo-1").await.unwrap();

        store
            .store_command_results(&cmd.id, 0, &[event("todo-1", &cmd.id, 1)])
            .await
            .unwrap();

        assert_eq!(store.get_or_create_version("todo-1").await.unwrap(), 1);
        let stored = store.get_command(&cmd.id).await.unwrap();
        assert_eq!(stored.status.as_deref(), Some(STATUS_FINISHED));
    }

    #[tokio::test]
    async fn wrong_expected_version_rolls_back_everything() {
        let store = MemoryStore::new();
        let cmd = command("todo-1");
        store.save_command_records(std::slice::from_ref(&cmd)).await.unwrap();
        store.get_or_create_version("todo-1").await.unwrap();

        let err = store
            .store_command_results(&cmd.id, 7, &[event("todo-1", &cmd.id, 8)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongExpectedVersion));

        // Nothing was written: no events, command still pending.
        assert!(store.load_events("todo-1").await.unwrap().is_empty());
        assert!(store.get_command(&cmd.id).await.unwrap().is_pending());
    }

    #[tokio::test]
    async fn concurrent_same_expected_version_writers_race_to_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let cmd_a = command("todo-1");
        let cmd_b = command("todo-1");
        store
            .save_command_records(&[cmd_a.clone(), cmd_b.clone()])
            .await
            .unwrap();
        store.get_or_create_version("todo-1").await.unwrap();

        let store_a = Arc::clone(&store);
        let ev_a = event("todo-1", &cmd_a.id, 1);
        let id_a = cmd_a.id.clone();
        let task_a =
            tokio::spawn(
                async move { store_a.store_command_results(&id_a, 0, &[ev_a]).await },
            );
        let store_b = Arc::clone(&store);
        let ev_b = event("todo-1", &cmd_b.id, 1);
        let id_b = cmd_b.id.clone();
        let task_b =
            tokio::spawn(
                async move { store_b.store_command_results(&id_b, 0, &[ev_b]).await },
            );

        let results = [task_a.await.unwrap(), task_b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::WrongExpectedVersion)))
            .count();
        assert_eq!(successes, 1, "exactly one writer must win");
        assert_eq!(conflicts, 1, "the loser must observe the conflict");
        assert_eq!(store.get_or_create_version("todo-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_results_skip_the_version_check() {
        let store = MemoryStore::new();
        let cmd = command("todo-1");
        store.save_command_records(std::slice::from_ref(&cmd)).await.unwrap();

        // No version row exists, but an empty result set needs no swap.
        store.store_command_results(&cmd.id, 99, &[]).await.unwrap();
        let stored = store.get_command(&cmd.id).await.unwrap();
        assert_eq!(stored.status.as_deref(), Some(STATUS_FINISHED));
    }

    #[tokio::test]
    async fn selection_partitions_by_hash_and_respects_limits() {
        let store = MemoryStore::new();
        let workers = 4;
        let mut records = Vec::new();
        for i in 0..20 {
            records.push(command(&format!("todo-{i}")));
        }
        store.save_command_records(&records).await.unwrap();

        let lanes = store.select_for_processing(workers, 3).await.unwrap();
        assert_eq!(lanes.len(), workers);
        let worker_count = i32::try_from(workers).unwrap();
        for (lane_index, lane) in lanes.iter().enumerate() {
            assert!(lane.len() <= 3);
            for record in lane {
                let expected = usize::try_from(record.aggregate_hash % worker_count).unwrap();
                assert_eq!(expected, lane_index, "lane affinity must hold");
            }
            // Each lane is ordered by command id.
            for pair in lane.windows(2) {
                assert!(pair[0].id < pair[1].id);
            }
        }
    }

    #[tokio::test]
    async fn same_aggregate_always_lands_in_the_same_lane() {
        let store = MemoryStore::new();
        let first = command("todo-same");
        let second = command("todo-same");
        store
            .save_command_records(&[first.clone(), second.clone()])
            .await
            .unwrap();

        let lanes = store.select_for_processing(8, 10).await.unwrap();
        let occupied: Vec<usize> = lanes
            .iter()
            .enumerate()
            .filter(|(_, lane)| !lane.is_empty())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(occupied.len(), 1, "both commands share one lane");
        let lane = lanes.get(occupied[0]).unwrap();
        assert_eq!(lane.len(), 2);
        assert_eq!(lane[0].id, first.id.min(second.id.clone()));
    }

    #[tokio::test]
    async fn finished_commands_are_not_selected() {
        let store = MemoryStore::new();
        let cmd = command("todo-1");
        store.save_command_records(std::slice::from_ref(&cmd)).await.unwrap();
        store.store_command_results(&cmd.id, 0, &[]).await.unwrap();

        let lanes = store.select_for_processing(2, 10).await.unwrap();
        assert!(lanes.iter().all(Vec::is_empty));
    }

    #[tokio::test]
    async fn subscription_cursor_lifecycle() {
        let store = MemoryStore::new();
        let cmd = command("todo-1");
        store.save_command_records(std::slice::from_ref(&cmd)).await.unwrap();
        store.get_or_create_version("todo-1").await.unwrap();
        let first = event("todo-1", &cmd.id, 1);
        let second = event("todo-1", &cmd.id, 2);
        store
            .store_command_results(&cmd.id, 0, &[first.clone(), second.clone()])
            .await
            .unwrap();

        let sub = store.insert_subscription("projection").await.unwrap();
        assert!(sub.last_seen_event_id.is_empty());

        let batch = store.select_events_for_subscription(&sub, 100).await.unwrap();
        assert_eq!(batch.len(), 2);

        let sub = store
            .update_subscription("projection", &batch[0].id)
            .await
            .unwrap();
        let rest = store.select_events_for_subscription(&sub, 100).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, second.id);

        // Without a cursor advance the same batch is redelivered.
        let again = store.select_events_for_subscription(&sub, 100).await.unwrap();
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn event_errors_are_excluded_from_reads() {
        let store = MemoryStore::new();
        let cmd = command("todo-1");
        store.save_command_records(std::slice::from_ref(&cmd)).await.unwrap();
        store.get_or_create_version("todo-1").await.unwrap();

        let mut failure = event("todo-1", &cmd.id, 1);
        failure.event_type = EVENT_ERROR_TYPE.to_owned();
        store
            .store_command_results(&cmd.id, 0, &[failure])
            .await
            .unwrap();

        assert!(store.load_events("todo-1").await.unwrap().is_empty());
        let sub = store.insert_subscription("projection").await.unwrap();
        assert!(
            store
                .select_events_for_subscription(&sub, 100)
                .await
                .unwrap()
                .is_empty()
        );
        // The sentinel still advanced the version.
        assert_eq!(store.get_or_create_version("todo-1").await.unwrap(), 1);
    }
}
