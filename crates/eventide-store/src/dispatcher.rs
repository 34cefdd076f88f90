//! Store-backed command dispatcher.
//!
//! The synchronous ingress path: prepare the command and insert its
//! record directly into the store. The bus-backed path in `eventide-bus`
//! implements the same [`CommandDispatcher`] contract asynchronously.

use std::sync::Arc;

use async_trait::async_trait;
use eventide_core::{CommandDispatcher, CommandEnvelope, DispatchError, command_to_record};

use crate::store::EventStore;

/// Dispatches commands by writing their records straight to the store.
pub struct StoreCommandDispatcher {
    domain: String,
    store: Arc<dyn EventStore>,
}

impl StoreCommandDispatcher {
    /// Create a dispatcher for one domain over the given store.
    pub fn new(domain: impl Into<String>, store: Arc<dyn EventStore>) -> Self {
        Self {
            domain: domain.into(),
            store,
        }
    }
}

#[async_trait]
impl CommandDispatcher for StoreCommandDispatcher {
    async fn dispatch(&self, mut command: CommandEnvelope) -> Result<String, DispatchError> {
        let record = command_to_record(&self.domain, &mut command)?;
        let command_id = record.id.clone();
        let saved = self
            .store
            .save_command_records(&[record])
            .await
            .map_err(|e| DispatchError::Backend(e.to_string()))?;
        // An empty result means the id was already queued; dispatch is
        // idempotent, so that still counts as success.
        tracing::debug!(
            command_id = %command_id,
            event_type = %command.event_type,
            persisted = !saved.is_empty(),
            "command dispatched"
        );
        Ok(command_id)
    }
}
