//! Error types for the execution engine.

use eventide_core::CoreError;
use eventide_store::StoreError;

/// Errors that can occur in the command processor, subscriber, or
/// service runner.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A core engine operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A projection publisher rejected a batch.
    #[error("publisher {group} failed: {message}")]
    Publish {
        /// The subscription group whose publisher failed.
        group: String,
        /// The publisher's error, as text.
        message: String,
    },

    /// A spawned task panicked or failed.
    #[error("task {name} failed: {message}")]
    Task {
        /// Name of the failed task.
        name: String,
        /// The failure, as text.
        message: String,
    },
}
