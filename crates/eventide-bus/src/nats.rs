//! NATS producer for the command topic.
//!
//! Publishes command messages on partitioned subjects
//! `{topic}.{partition}` where the partition is the deterministic hash of
//! the message key modulo the partition count -- the same key always maps
//! to the same subject, preserving per-aggregate ordering for subject
//! subscribers.

use async_trait::async_trait;
use eventide_core::fnv1a_32;
use tracing::{debug, info};

use crate::error::BusError;
use crate::message::BusMessage;
use crate::transport::{AckMode, BusProducer};

/// NATS-backed [`BusProducer`].
pub struct NatsProducer {
    client: async_nats::Client,
    topic: String,
    partitions: u32,
}

impl NatsProducer {
    /// Connect to a NATS server and produce onto `topic` spread over
    /// `partitions` subjects.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Transport`] if the connection cannot be
    /// established.
    pub async fn connect(url: &str, topic: &str, partitions: u32) -> Result<Self, BusError> {
        info!(url = url, topic = topic, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Transport(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self {
            client,
            topic: topic.to_owned(),
            partitions: partitions.max(1),
        })
    }

    /// The subject a key's messages are published on.
    pub fn subject_for(&self, key: &str) -> String {
        partition_subject(&self.topic, self.partitions, key)
    }
}

/// Map a message key onto its partitioned subject.
///
/// Deterministic: the same key always lands on the same subject for a
/// fixed partition count.
pub fn partition_subject(topic: &str, partitions: u32, key: &str) -> String {
    let partition = fnv1a_32(key) % partitions.max(1);
    format!("{topic}.{partition}")
}

#[async_trait]
impl BusProducer for NatsProducer {
    async fn produce(&self, message: BusMessage, ack: AckMode) -> Result<(), BusError> {
        let subject = self.subject_for(&message.key);
        debug!(subject = %subject, key = %message.key, "publishing command message");
        self.client
            .publish(subject.clone(), message.data.into())
            .await
            .map_err(|e| BusError::Transport(format!("failed to publish to {subject}: {e}")))?;
        if matches!(ack, AckMode::WaitForAck) {
            self.client
                .flush()
                .await
                .map_err(|e| BusError::Transport(format!("flush failed: {e}")))?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Transport(format!("flush failed: {e}")))
    }
}

impl std::fmt::Debug for NatsProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsProducer")
            .field("topic", &self.topic)
            .field("partitions", &self.partitions)
            .finish()
    }
}
