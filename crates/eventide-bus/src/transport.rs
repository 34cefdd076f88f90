//! Transport contracts for the message bus.
//!
//! The broker client is an external collaborator; the engine only relies
//! on these capabilities: keyed produce with or without a broker ack, and
//! consumer-group consumption with partition assignment callbacks and
//! manual offset commit.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BusError;
use crate::message::BusMessage;

/// A partition index within one topic.
pub type PartitionId = u32;

/// Whether a produce call waits for the broker to acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Return as soon as the message is handed to the client.
    FireAndForget,
    /// Return only after the broker has acknowledged the message.
    WaitForAck,
}

/// A message delivered to a consumer, with its position on the topic.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// The partition the message was read from.
    pub partition: PartitionId,
    /// The message's offset within the partition.
    pub offset: u64,
    /// The message itself.
    pub message: BusMessage,
}

/// What a consumer observes while polling its transport.
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    /// Partitions were assigned to this consumer instance. Offset
    /// tracking state must be reset.
    Assigned(Vec<PartitionId>),
    /// Partitions are being revoked. Pending offsets must be committed
    /// synchronously before the next poll.
    Revoked(Vec<PartitionId>),
    /// A message on one of the assigned partitions.
    Message(IncomingMessage),
}

/// Produce side of the bus client.
#[async_trait]
pub trait BusProducer: Send + Sync {
    /// Publish a keyed message.
    async fn produce(&self, message: BusMessage, ack: AckMode) -> Result<(), BusError>;

    /// Drain any buffered messages to the broker.
    async fn flush(&self) -> Result<(), BusError> {
        Ok(())
    }
}

/// Consume side of the bus client, owned by one consumer instance.
#[async_trait]
pub trait BusConsumer: Send {
    /// Wait up to `timeout` for the next consumer event.
    ///
    /// Returns `Ok(None)` when nothing arrived within the timeout.
    async fn next_event(&mut self, timeout: Duration) -> Result<Option<ConsumerEvent>, BusError>;

    /// Commit next-read offsets for this consumer's partitions.
    async fn commit(&mut self, offsets: &HashMap<PartitionId, u64>) -> Result<(), BusError>;
}
