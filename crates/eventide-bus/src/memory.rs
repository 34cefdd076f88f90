//! In-process bus transport with consumer-group semantics.
//!
//! Implements what the consumer machinery expects from a real broker:
//! topics with a fixed partition count, key-hash partition placement,
//! consumer groups with round-robin partition assignment, rebalance
//! notifications (revoke-then-assign) when members join or leave, and
//! committed offsets per group -- a freshly assigned consumer resumes
//! from the group's committed offset, so uncommitted messages are
//! redelivered (at-least-once).
//!
//! Used by tests and examples; production deployments put a real broker
//! behind the same [`BusProducer`] / [`BusConsumer`] traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use eventide_core::fnv1a_32;
use tokio::time::Instant;

use crate::error::BusError;
use crate::message::BusMessage;
use crate::transport::{
    AckMode, BusConsumer, BusProducer, ConsumerEvent, IncomingMessage, PartitionId,
};

/// How long a polling consumer sleeps between scans.
const POLL_SLEEP: Duration = Duration::from_millis(5);

struct Group {
    /// Member ids in join order; partition `p` belongs to member
    /// `members[p mod len]`.
    members: Vec<u64>,
    /// Committed next-read offset per partition.
    committed: HashMap<PartitionId, u64>,
    /// Bumped on every membership change; consumers observing a new
    /// generation go through revoke/assign.
    generation: u64,
}

struct Topic {
    partitions: Vec<Vec<BusMessage>>,
    groups: HashMap<String, Group>,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<String, Topic>,
    next_member_id: u64,
}

impl Inner {
    fn topic_mut(&mut self, name: &str, partitions: u32) -> &mut Topic {
        self.topics.entry(name.to_owned()).or_insert_with(|| Topic {
            partitions: vec![Vec::new(); usize::try_from(partitions.max(1)).unwrap_or(1)],
            groups: HashMap::new(),
        })
    }
}

/// The in-process broker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Mutex<Inner>>,
    partitions: u32,
}

impl MemoryBus {
    /// Create a broker whose topics have `partitions` partitions.
    pub fn new(partitions: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            partitions: partitions.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a producer handle publishing onto `topic`.
    pub fn producer(&self, topic: &str) -> MemoryProducer {
        self.lock().topic_mut(topic, self.partitions);
        MemoryProducer {
            bus: self.clone(),
            topic: topic.to_owned(),
        }
    }

    /// Join `group` on `topic` as a new consumer instance.
    ///
    /// Joining bumps the group generation, triggering a rebalance for
    /// every member.
    pub fn consumer(&self, topic: &str, group: &str) -> MemoryBusConsumer {
        let member_id = {
            let mut inner = self.lock();
            let member_id = inner.next_member_id;
            inner.next_member_id = inner.next_member_id.wrapping_add(1);
            let topic_state = inner.topic_mut(topic, self.partitions);
            let group_state =
                topic_state.groups.entry(group.to_owned()).or_insert_with(|| Group {
                    members: Vec::new(),
                    committed: HashMap::new(),
                    generation: 0,
                });
            group_state.members.push(member_id);
            group_state.generation = group_state.generation.wrapping_add(1);
            member_id
        };
        MemoryBusConsumer {
            bus: self.clone(),
            topic: topic.to_owned(),
            group: group.to_owned(),
            member_id,
            seen_generation: 0,
            revoke_delivered: false,
            assigned: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

/// Producer handle onto one topic of a [`MemoryBus`].
#[derive(Clone)]
pub struct MemoryProducer {
    bus: MemoryBus,
    topic: String,
}

#[async_trait]
impl BusProducer for MemoryProducer {
    async fn produce(&self, message: BusMessage, _ack: AckMode) -> Result<(), BusError> {
        let mut inner = self.bus.lock();
        let topic = inner.topic_mut(&self.topic, self.bus.partitions);
        let count = u32::try_from(topic.partitions.len()).unwrap_or(1).max(1);
        let partition = usize::try_from(fnv1a_32(&message.key) % count).unwrap_or(0);
        if let Some(log) = topic.partitions.get_mut(partition) {
            log.push(message);
        }
        Ok(())
    }
}

/// One consumer group member over a [`MemoryBus`] topic.
///
/// Leaving (dropping) the consumer bumps the group generation so the
/// remaining members rebalance.
pub struct MemoryBusConsumer {
    bus: MemoryBus,
    topic: String,
    group: String,
    member_id: u64,
    seen_generation: u64,
    revoke_delivered: bool,
    assigned: Vec<PartitionId>,
    /// Next-read position per assigned partition.
    positions: HashMap<PartitionId, u64>,
}

impl MemoryBusConsumer {
    fn poll_state(&mut self) -> Option<ConsumerEvent> {
        let mut inner = self.bus.lock();
        let topic = inner.topics.get_mut(&self.topic)?;
        let partition_count = u32::try_from(topic.partitions.len()).unwrap_or(0);
        let group = topic.groups.get_mut(&self.group)?;

        if group.generation != self.seen_generation {
            // A rebalance is in progress for this member: revoke the old
            // assignment first so the machinery can commit, then hand
            // out the new assignment.
            if !self.assigned.is_empty() && !self.revoke_delivered {
                self.revoke_delivered = true;
                return Some(ConsumerEvent::Revoked(self.assigned.clone()));
            }
            let members = &group.members;
            let mut assigned = Vec::new();
            if !members.is_empty() {
                for partition in 0..partition_count {
                    let owner_index = usize::try_from(partition).unwrap_or(0) % members.len();
                    if members.get(owner_index) == Some(&self.member_id) {
                        assigned.push(partition);
                    }
                }
            }
            // A fresh assignee resumes from the group's committed
            // offsets; anything uncommitted is redelivered.
            self.positions = assigned
                .iter()
                .map(|p| (*p, group.committed.get(p).copied().unwrap_or(0)))
                .collect();
            self.assigned.clone_from(&assigned);
            self.seen_generation = group.generation;
            self.revoke_delivered = false;
            return Some(ConsumerEvent::Assigned(assigned));
        }

        for partition in &self.assigned {
            let position = self.positions.entry(*partition).or_insert(0);
            let log = topic.partitions.get(usize::try_from(*partition).unwrap_or(0))?;
            let index = usize::try_from(*position).unwrap_or(usize::MAX);
            if let Some(message) = log.get(index) {
                let offset = *position;
                *position = position.saturating_add(1);
                return Some(ConsumerEvent::Message(IncomingMessage {
                    partition: *partition,
                    offset,
                    message: message.clone(),
                }));
            }
        }
        None
    }
}

#[async_trait]
impl BusConsumer for MemoryBusConsumer {
    async fn next_event(&mut self, timeout: Duration) -> Result<Option<ConsumerEvent>, BusError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.poll_state() {
                return Ok(Some(event));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_SLEEP).await;
        }
    }

    async fn commit(&mut self, offsets: &HashMap<PartitionId, u64>) -> Result<(), BusError> {
        let mut inner = self.bus.lock();
        let topic = inner
            .topics
            .get_mut(&self.topic)
            .ok_or_else(|| BusError::Transport(format!("unknown topic {}", self.topic)))?;
        let group = topic
            .groups
            .get_mut(&self.group)
            .ok_or_else(|| BusError::Transport(format!("unknown group {}", self.group)))?;
        for (partition, offset) in offsets {
            group.committed.insert(*partition, *offset);
        }
        Ok(())
    }
}

impl Drop for MemoryBusConsumer {
    fn drop(&mut self) {
        let mut inner = self.bus.lock();
        if let Some(topic) = inner.topics.get_mut(&self.topic) {
            if let Some(group) = topic.groups.get_mut(&self.group) {
                group.members.retain(|member| *member != self.member_id);
                group.generation = group.generation.wrapping_add(1);
            }
        }
    }
}
