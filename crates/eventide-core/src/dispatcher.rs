//! Command dispatch contract.
//!
//! Dispatchers take a prepared command envelope and make it durable: the
//! store-backed dispatcher inserts the command record directly, the
//! bus-backed dispatcher publishes it to a partitioned topic from which a
//! consumer group saves it. Both return the command id the caller can
//! poll for completion.

use async_trait::async_trait;

use crate::command::CommandEnvelope;
use crate::error::CoreError;

/// Errors produced by command dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The command failed preparation or validation.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    /// The backing store or bus rejected the dispatch.
    #[error("dispatch failed: {0}")]
    Backend(String),
}

/// Asynchronous command ingress.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Prepare the command and make it durable, returning its id.
    async fn dispatch(&self, command: CommandEnvelope) -> Result<String, DispatchError>;

    /// Flush and release any buffered dispatches.
    async fn close(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}
