//! Per-message work contract and the save-command worker.

use std::sync::Arc;

use async_trait::async_trait;
use eventide_store::EventStore;
use tracing::debug;

use crate::message::{BusMessage, message_to_command_record};

/// Handles one bus message at a time.
///
/// Returning an error makes the consumer retry the same message with
/// backoff; the worker must therefore be idempotent.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Process a single message.
    async fn process(&self, message: &BusMessage) -> anyhow::Result<()>;
}

/// Drains command messages from the bus into the store.
///
/// Duplicate command ids are silently ignored by the store, so redelivery
/// after an unclean shutdown (at-least-once) is safe.
pub struct SaveCommandWorker {
    store: Arc<dyn EventStore>,
}

impl SaveCommandWorker {
    /// Create a worker saving into the given store.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Worker for SaveCommandWorker {
    async fn process(&self, message: &BusMessage) -> anyhow::Result<()> {
        let record = message_to_command_record(message)?;
        debug!(
            command_id = %record.id,
            aggregate_id = %record.aggregate_id,
            event_type = %record.event_type,
            "saving bus command"
        );
        self.store.save_command_records(&[record]).await?;
        Ok(())
    }
}
