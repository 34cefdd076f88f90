//! Event capability trait, replay envelopes, and the failure sentinel.
//!
//! Events are immutable facts. The engine moves them around in two forms:
//! the typed [`Event`] payload (produced by handlers, reconstructed by the
//! registry) and the persisted [`EventRecord`]. An [`EventEnvelope`] pairs
//! the identity columns with the typed payload for replay.

use chrono::Utc;

use crate::aggregate::AggregateRoot;
use crate::error::CoreError;
use crate::record::EventRecord;
use crate::registry::Registry;

/// Type name of the [`EventError`] sentinel.
pub const EVENT_ERROR_TYPE: &str = "EventError";

/// Capability trait every domain event implements.
pub trait Event: Send + Sync {
    /// The registered type name, e.g. `"TodoCreated"`.
    fn event_type(&self) -> &'static str;

    /// Mutate the concrete aggregate this event targets.
    ///
    /// Implementations downcast through
    /// [`AggregateRoot::as_any_mut`] and fail with
    /// [`CoreError::InvalidAggregate`] when handed the wrong type.
    fn apply(&self, aggregate: &mut dyn AggregateRoot) -> Result<(), CoreError>;

    /// Serialize the event into its JSON payload.
    fn payload(&self) -> Result<serde_json::Value, serde_json::Error>;
}

/// An event plus the identity columns needed for replay.
pub struct EventEnvelope {
    /// Time-sortable unique event id.
    pub id: String,
    /// The aggregate the event belongs to.
    pub aggregate_id: String,
    /// Registered type name.
    pub event_type: String,
    /// Position in the aggregate's stream (1-based).
    pub version: u64,
    /// The typed payload; `None` for [`EventError`] sentinels, which are
    /// never applied.
    pub event: Option<Box<dyn Event>>,
}

impl EventEnvelope {
    /// Whether this envelope is the failure sentinel.
    pub fn is_event_error(&self) -> bool {
        self.event_type == EVENT_ERROR_TYPE
    }
}

/// Sentinel event recording a failed command without domain effect.
///
/// It occupies the next version slot so the aggregate's stream stays
/// contiguous, and every replay/subscription read path skips it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EventError {
    /// The handler failure, as text.
    pub error: String,
}

impl EventError {
    /// Capture a handler failure.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl Event for EventError {
    fn event_type(&self) -> &'static str {
        EVENT_ERROR_TYPE
    }

    fn apply(&self, _aggregate: &mut dyn AggregateRoot) -> Result<(), CoreError> {
        Err(CoreError::InvalidEvent(
            "EventError is a sentinel and cannot be applied".into(),
        ))
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Build the persisted record for a version-stamped event.
pub fn event_to_record(
    event: &dyn Event,
    id: impl Into<String>,
    command_id: impl Into<String>,
    aggregate_id: impl Into<String>,
    version: u64,
) -> Result<EventRecord, CoreError> {
    Ok(EventRecord {
        id: id.into(),
        command_id: command_id.into(),
        aggregate_id: aggregate_id.into(),
        event_type: event.event_type().to_owned(),
        version,
        data: event.payload()?,
        created_at: Utc::now(),
    })
}

/// Reconstruct a typed replay envelope from a persisted record.
///
/// [`EventError`] records yield an envelope with no payload (they are
/// skipped by [`load`](crate::aggregate::load)); any other type name must
/// have a registered constructor.
///
/// # Errors
///
/// Returns [`CoreError::UnregisteredEvent`] for unknown type names and
/// [`CoreError::Serialization`] for undecodable payloads.
pub fn record_to_envelope(
    registry: &Registry,
    record: &EventRecord,
) -> Result<EventEnvelope, CoreError> {
    let event = if record.event_type == EVENT_ERROR_TYPE {
        None
    } else {
        let ctor = registry
            .event(&record.event_type)
            .ok_or_else(|| CoreError::UnregisteredEvent(record.event_type.clone()))?;
        Some(ctor(&record.data)?)
    };
    Ok(EventEnvelope {
        id: record.id.clone(),
        aggregate_id: record.aggregate_id.clone(),
        event_type: record.event_type.clone(),
        version: record.version,
        event,
    })
}

/// Reconstruct a whole stream of replay envelopes, in order.
pub fn records_to_envelopes(
    registry: &Registry,
    records: &[EventRecord],
) -> Result<Vec<EventEnvelope>, CoreError> {
    records
        .iter()
        .map(|record| record_to_envelope(registry, record))
        .collect()
}
