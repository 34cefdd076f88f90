//! Error taxonomy for the core engine.
//!
//! Validation failures ([`CoreError::InvalidCommand`],
//! [`CoreError::InvalidEvent`]) surface synchronously to the command's
//! originator. Replay-invariant violations ([`CoreError::DuplicateEvent`],
//! [`CoreError::NilAggregate`], [`CoreError::InvalidAggregate`]) abort a
//! replay. Registry misses ([`CoreError::UnregisteredCommand`],
//! [`CoreError::UnregisteredEvent`]) mark a record the processor cannot
//! reconstruct and must abandon.

/// Errors produced by the core aggregate/command/event machinery.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A command failed structural validation or is missing identity fields.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// An event is malformed, absent, or cannot be applied.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// An event's version is not greater than the aggregate's version.
    ///
    /// This is the idempotent replay guard: re-applying an already seen
    /// event must fail rather than corrupt the aggregate.
    #[error("event version {event_version} is not greater than aggregate version {aggregate_version}: duplicate event")]
    DuplicateEvent {
        /// The version carried by the offending event.
        event_version: u64,
        /// The aggregate's current version.
        aggregate_version: u64,
    },

    /// No aggregate was available to replay into.
    #[error("nil aggregate")]
    NilAggregate,

    /// An event was applied to the wrong concrete aggregate type.
    #[error("invalid aggregate: {0}")]
    InvalidAggregate(String),

    /// No constructor is registered for the command type name.
    #[error("unregistered command type {0}")]
    UnregisteredCommand(String),

    /// No constructor is registered for the event type name.
    #[error("unregistered event type {0}")]
    UnregisteredEvent(String),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether this error marks a record the processor should abandon
    /// rather than retry: the record can never be reconstructed into a
    /// typed command (unknown type name or undecodable payload).
    pub const fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::UnregisteredCommand(_) | Self::UnregisteredEvent(_) | Self::Serialization(_)
        )
    }
}
