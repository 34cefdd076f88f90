//! Error types for the bus layer.

/// Errors that can occur in the bus dispatch and consumer machinery.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A message payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying transport (broker client) failed. Transport
    /// failures are fatal to the consumer instance that observes them.
    #[error("transport error: {0}")]
    Transport(String),
}
