//! End-to-end tests for the bus ingress path and the consumer-group
//! machinery, running against the in-process bus transport.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::missing_panics_doc
)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eventide_bus::{
    AckMode, BusConsumer, BusDispatcher, BusMessage, BusProducer, Consumer, ConsumerConfig,
    ConsumerEvent, MemoryBus, SaveCommandWorker, Worker, message_to_command_record,
};
use eventide_core::{Command, CommandContext, CommandDispatcher, CommandEnvelope, Event};
use eventide_store::{EventStore, MemoryStore};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

const TOPIC: &str = "commands.todo";
const GROUP: &str = "todo-ingest";

#[derive(Debug, Serialize, Deserialize)]
struct QueueNote {
    id: String,
    body: String,
}

#[async_trait]
impl Command for QueueNote {
    fn command_type(&self) -> &'static str {
        "QueueNote"
    }

    fn aggregate_key(&self) -> String {
        self.id.clone()
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    async fn handle(&self, _ctx: &CommandContext<'_>) -> anyhow::Result<Vec<Box<dyn Event>>> {
        Ok(Vec::new())
    }
}

fn message(key: &str, body: &str) -> BusMessage {
    BusMessage {
        key: key.to_owned(),
        data: body.as_bytes().to_vec(),
        timestamp: None,
    }
}

fn test_config() -> ConsumerConfig {
    ConsumerConfig {
        commit_interval: 10,
        poll_timeout: Duration::from_millis(50),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    }
}

/// Poll `check` every 10 ms until it returns true or the timeout hits.
async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: AsyncFnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Ingress pipeline: dispatcher -> bus -> consumer -> store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatched_commands_flow_through_the_consumer_into_the_store() {
    let bus = MemoryBus::new(4);
    let dispatcher = BusDispatcher::new(
        Arc::new(bus.producer(TOPIC)),
        "todo",
        AckMode::WaitForAck,
    );
    let store = Arc::new(MemoryStore::new());
    let worker = Arc::new(SaveCommandWorker::new(
        Arc::clone(&store) as Arc<dyn EventStore>
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = Consumer::new(bus.consumer(TOPIC, GROUP), worker);
    let consumer_task = tokio::spawn(consumer.run(shutdown_rx));

    let mut command_ids = Vec::new();
    for i in 0..5 {
        let id = dispatcher
            .dispatch(CommandEnvelope::new(Box::new(QueueNote {
                id: format!("{}", i % 2),
                body: format!("note {i}"),
            })))
            .await
            .expect("dispatch should succeed");
        command_ids.push(id);
    }

    let all_arrived = eventually(Duration::from_secs(5), async || {
        for id in &command_ids {
            if store.get_command(id).await.is_err() {
                return false;
            }
        }
        true
    })
    .await;
    assert!(all_arrived, "all dispatched commands must reach the store");

    let record = store.get_command(&command_ids[0]).await.unwrap();
    assert_eq!(record.aggregate_id, "todo-0");
    assert_eq!(record.event_type, "QueueNote");
    assert!(record.is_pending());

    shutdown_tx.send(true).unwrap();
    consumer_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn redelivered_commands_are_deduplicated_by_the_store() {
    let store = Arc::new(MemoryStore::new());
    let worker = SaveCommandWorker::new(Arc::clone(&store) as Arc<dyn EventStore>);

    let mut envelope = CommandEnvelope::new(Box::new(QueueNote {
        id: "7".into(),
        body: "same".into(),
    }));
    let record = eventide_core::command_to_record("todo", &mut envelope).unwrap();
    let bus_message = eventide_bus::command_record_to_message(&record).unwrap();

    // At-least-once delivery: the same message can arrive twice.
    worker.process(&bus_message).await.unwrap();
    worker.process(&bus_message).await.unwrap();

    let decoded = message_to_command_record(&bus_message).unwrap();
    let stored = store.get_command(&decoded.id).await.unwrap();
    assert_eq!(stored.id, record.id);
}

// ---------------------------------------------------------------------------
// Retry/backoff
// ---------------------------------------------------------------------------

/// Fails a configurable number of times before succeeding; records every
/// payload it successfully processed.
struct FlakyWorker {
    failures_left: Mutex<usize>,
    attempts: Mutex<usize>,
    processed: Mutex<Vec<String>>,
}

impl FlakyWorker {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: Mutex::new(failures),
            attempts: Mutex::new(0),
            processed: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Worker for FlakyWorker {
    async fn process(&self, message: &BusMessage) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("downstream unavailable");
            }
        }
        self.processed
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&message.data).into_owned());
        Ok(())
    }
}

#[tokio::test]
async fn failing_messages_block_and_retry_with_backoff_until_success() {
    let bus = MemoryBus::new(1);
    let producer = bus.producer(TOPIC);
    producer.produce(message("k", "first"), AckMode::FireAndForget).await.unwrap();
    producer.produce(message("k", "second"), AckMode::FireAndForget).await.unwrap();

    let worker = FlakyWorker::new(3);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = Consumer::with_config(
        bus.consumer(TOPIC, GROUP),
        Arc::clone(&worker) as Arc<dyn Worker>,
        test_config(),
    );
    let consumer_task = tokio::spawn(consumer.run(shutdown_rx));

    let done = eventually(Duration::from_secs(5), async || {
        worker.processed.lock().unwrap().len() == 2
    })
    .await;
    assert!(done, "both messages must eventually process");

    // The first message needed its retries; the partition stayed blocked
    // so ordering held.
    let attempts = *worker.attempts.lock().unwrap();
    assert_eq!(attempts, 5, "3 failures + 2 successes");
    assert_eq!(*worker.processed.lock().unwrap(), vec!["first", "second"]);

    shutdown_tx.send(true).unwrap();
    consumer_task.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Offsets and rebalancing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offsets_flush_on_shutdown_and_a_new_member_resumes_after_them() {
    let bus = MemoryBus::new(1);
    let producer = bus.producer(TOPIC);
    for i in 0..3 {
        producer
            .produce(message("k", &format!("m{i}")), AckMode::FireAndForget)
            .await
            .unwrap();
    }

    let worker = FlakyWorker::new(0);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = Consumer::with_config(
        bus.consumer(TOPIC, GROUP),
        Arc::clone(&worker) as Arc<dyn Worker>,
        test_config(),
    );
    let consumer_task = tokio::spawn(consumer.run(shutdown_rx));

    assert!(
        eventually(Duration::from_secs(5), async || {
            worker.processed.lock().unwrap().len() == 3
        })
        .await
    );
    // commit_interval is 10, so nothing has been committed mid-stream;
    // shutdown must flush the pending offsets.
    shutdown_tx.send(true).unwrap();
    consumer_task.await.unwrap().unwrap();

    producer.produce(message("k", "m3"), AckMode::FireAndForget).await.unwrap();

    let second_worker = FlakyWorker::new(0);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = Consumer::with_config(
        bus.consumer(TOPIC, GROUP),
        Arc::clone(&second_worker) as Arc<dyn Worker>,
        test_config(),
    );
    let consumer_task = tokio::spawn(consumer.run(shutdown_rx));

    assert!(
        eventually(Duration::from_secs(5), async || {
            !second_worker.processed.lock().unwrap().is_empty()
        })
        .await
    );
    shutdown_tx.send(true).unwrap();
    consumer_task.await.unwrap().unwrap();

    // The committed offsets kept the already-processed messages from
    // being redelivered to the new member.
    assert_eq!(*second_worker.processed.lock().unwrap(), vec!["m3"]);
}

#[tokio::test]
async fn joining_member_triggers_revoke_then_assign() {
    let bus = MemoryBus::new(4);
    let timeout = Duration::from_millis(500);

    let mut first = bus.consumer(TOPIC, GROUP);
    let event = first.next_event(timeout).await.unwrap().unwrap();
    let ConsumerEvent::Assigned(initial) = event else {
        panic!("expected initial assignment, got {event:?}");
    };
    assert_eq!(initial, vec![0, 1, 2, 3], "sole member owns every partition");

    let mut second = bus.consumer(TOPIC, GROUP);

    let event = first.next_event(timeout).await.unwrap().unwrap();
    let ConsumerEvent::Revoked(revoked) = event else {
        panic!("expected revocation before reassignment, got {event:?}");
    };
    assert_eq!(revoked, vec![0, 1, 2, 3]);

    let ConsumerEvent::Assigned(first_assignment) =
        first.next_event(timeout).await.unwrap().unwrap()
    else {
        panic!("expected reassignment");
    };
    let ConsumerEvent::Assigned(second_assignment) =
        second.next_event(timeout).await.unwrap().unwrap()
    else {
        panic!("expected assignment for the new member");
    };

    // The group's partitions are split disjointly across both members.
    let mut union: Vec<u32> = first_assignment
        .iter()
        .chain(second_assignment.iter())
        .copied()
        .collect();
    union.sort_unstable();
    assert_eq!(union, vec![0, 1, 2, 3]);
    assert!(first_assignment.iter().all(|p| !second_assignment.contains(p)));
}

#[tokio::test]
async fn uncommitted_reads_are_redelivered_after_a_member_leaves() {
    let bus = MemoryBus::new(1);
    let producer = bus.producer(TOPIC);
    producer.produce(message("k", "a"), AckMode::FireAndForget).await.unwrap();
    producer.produce(message("k", "b"), AckMode::FireAndForget).await.unwrap();

    let timeout = Duration::from_millis(500);
    let mut first = bus.consumer(TOPIC, GROUP);
    assert!(matches!(
        first.next_event(timeout).await.unwrap().unwrap(),
        ConsumerEvent::Assigned(_)
    ));
    // Read both messages without committing.
    for _ in 0..2 {
        assert!(matches!(
            first.next_event(timeout).await.unwrap().unwrap(),
            ConsumerEvent::Message(_)
        ));
    }
    drop(first);

    // The next member starts from the committed offset (none), so both
    // messages come again.
    let mut second = bus.consumer(TOPIC, GROUP);
    assert!(matches!(
        second.next_event(timeout).await.unwrap().unwrap(),
        ConsumerEvent::Assigned(_)
    ));
    let mut redelivered = Vec::new();
    while let Some(ConsumerEvent::Message(incoming)) = second.next_event(timeout).await.unwrap() {
        redelivered.push(String::from_utf8_lossy(&incoming.message.data).into_owned());
        if redelivered.len() == 2 {
            break;
        }
    }
    assert_eq!(redelivered, vec!["a", "b"]);

    // After committing past both, a fresh member sees nothing.
    let offsets: HashMap<u32, u64> = [(0, 2)].into_iter().collect();
    second.commit(&offsets).await.unwrap();
    drop(second);

    let mut third = bus.consumer(TOPIC, GROUP);
    assert!(matches!(
        third.next_event(timeout).await.unwrap().unwrap(),
        ConsumerEvent::Assigned(_)
    ));
    assert!(third.next_event(Duration::from_millis(100)).await.unwrap().is_none());
}

#[tokio::test]
async fn same_key_messages_stay_ordered_within_their_partition() {
    let bus = MemoryBus::new(8);
    let producer = bus.producer(TOPIC);
    for i in 0..10 {
        producer
            .produce(message("todo-42", &format!("{i}")), AckMode::FireAndForget)
            .await
            .unwrap();
    }

    let timeout = Duration::from_millis(500);
    let mut consumer = bus.consumer(TOPIC, GROUP);
    assert!(matches!(
        consumer.next_event(timeout).await.unwrap().unwrap(),
        ConsumerEvent::Assigned(_)
    ));

    let mut bodies = Vec::new();
    let mut partitions = Vec::new();
    while bodies.len() < 10 {
        match consumer.next_event(timeout).await.unwrap() {
            Some(ConsumerEvent::Message(incoming)) => {
                partitions.push(incoming.partition);
                bodies.push(String::from_utf8_lossy(&incoming.message.data).into_owned());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    let expected: Vec<String> = (0..10).map(|i| format!("{i}")).collect();
    assert_eq!(bodies, expected, "per-key ordering must hold");
    assert!(
        partitions.iter().all(|p| *p == partitions[0]),
        "one key maps to one partition"
    );
}
