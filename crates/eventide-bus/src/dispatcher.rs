//! Bus-backed command dispatcher.
//!
//! The asynchronous ingress path: prepare the command, serialize its
//! record, and publish it keyed by aggregate id. The broker's partition
//! affinity for the key preserves per-aggregate ordering on the wire; a
//! consumer group saves the records into the store on the other side.

use std::sync::Arc;

use async_trait::async_trait;
use eventide_core::{CommandDispatcher, CommandEnvelope, DispatchError, command_to_record};
use tracing::debug;

use crate::message::command_record_to_message;
use crate::transport::{AckMode, BusProducer};

/// Dispatches commands by publishing their records to the command topic.
pub struct BusDispatcher {
    producer: Arc<dyn BusProducer>,
    domain: String,
    ack: AckMode,
}

impl BusDispatcher {
    /// Create a dispatcher for one domain over the given producer.
    pub fn new(producer: Arc<dyn BusProducer>, domain: impl Into<String>, ack: AckMode) -> Self {
        Self {
            producer,
            domain: domain.into(),
            ack,
        }
    }
}

#[async_trait]
impl CommandDispatcher for BusDispatcher {
    async fn dispatch(&self, mut command: CommandEnvelope) -> Result<String, DispatchError> {
        let record = command_to_record(&self.domain, &mut command)?;
        let message = command_record_to_message(&record)
            .map_err(|e| DispatchError::Backend(e.to_string()))?;
        self.producer
            .produce(message, self.ack)
            .await
            .map_err(|e| DispatchError::Backend(e.to_string()))?;
        debug!(
            command_id = %record.id,
            aggregate_id = %record.aggregate_id,
            event_type = %record.event_type,
            ack = ?self.ack,
            "command published"
        );
        Ok(record.id)
    }

    async fn close(&self) -> Result<(), DispatchError> {
        self.producer
            .flush()
            .await
            .map_err(|e| DispatchError::Backend(e.to_string()))
    }
}
