//! The aggregate replay/mutation engine.
//!
//! An aggregate's state is derived purely by replaying its ordered event
//! stream. [`raise_event`] applies a single event under the replay
//! invariants; [`load`] folds a stream, skipping [`EventError`] sentinels.
//!
//! Aggregates are owned exclusively by whichever execution context is
//! replaying them; they are never shared across tasks.
//!
//! [`EventError`]: crate::event::EventError

use std::any::Any;
use std::sync::Arc;

use crate::error::CoreError;
use crate::event::EventEnvelope;

/// Identity and version shared by every aggregate.
///
/// Domain aggregates embed this struct and expose it through
/// [`AggregateRoot::base`] / [`AggregateRoot::base_mut`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateBase {
    /// The aggregate id, formatted `"<domain>-<local-id>"`.
    pub id: String,
    /// The aggregate kind, e.g. `"todo"`.
    pub kind: String,
    /// Replay version. Strictly increases only via successful event
    /// application; uniquely identifies a replay-consistent state.
    pub version: u64,
}

impl AggregateBase {
    /// Create a fresh base of the given kind at version 0.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind: kind.into(),
            version: 0,
        }
    }
}

/// Capability set every aggregate implements.
///
/// Event application is double-dispatched: the event downcasts the
/// aggregate through [`AggregateRoot::as_any_mut`] to its concrete type
/// and fails with [`CoreError::InvalidAggregate`] on a mismatch.
pub trait AggregateRoot: Send {
    /// Shared identity and version.
    fn base(&self) -> &AggregateBase;

    /// Mutable access to the shared identity and version.
    fn base_mut(&mut self) -> &mut AggregateBase;

    /// Downcast hook for concrete event application.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The domain state as JSON, for read-side endpoints.
    fn state_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// The aggregate id.
    fn id(&self) -> &str {
        &self.base().id
    }

    /// The aggregate kind.
    fn kind(&self) -> &str {
        &self.base().kind
    }

    /// The current replay version.
    fn version(&self) -> u64 {
        self.base().version
    }
}

/// Constructor for a fresh, unloaded aggregate of one concrete kind.
pub type AggregateFactory = Arc<dyn Fn() -> Box<dyn AggregateRoot> + Send + Sync>;

/// Apply a single event envelope to an aggregate.
///
/// # Errors
///
/// - [`CoreError::InvalidEvent`] if the envelope carries no payload or a
///   zero version
/// - [`CoreError::DuplicateEvent`] if the event's version is not greater
///   than the aggregate's (idempotent replay guard)
/// - [`CoreError::InvalidAggregate`] if the event targets a different
///   concrete aggregate type
///
/// On success the aggregate's version becomes the event's version.
pub fn raise_event(
    aggregate: &mut dyn AggregateRoot,
    envelope: &EventEnvelope,
) -> Result<(), CoreError> {
    let event = envelope
        .event
        .as_deref()
        .ok_or_else(|| CoreError::InvalidEvent(format!("{} has no payload", envelope.event_type)))?;
    if envelope.version == 0 {
        return Err(CoreError::InvalidEvent(format!(
            "{} has version 0",
            envelope.event_type
        )));
    }
    if envelope.version <= aggregate.base().version {
        return Err(CoreError::DuplicateEvent {
            event_version: envelope.version,
            aggregate_version: aggregate.base().version,
        });
    }
    event.apply(aggregate)?;
    aggregate.base_mut().version = envelope.version;
    Ok(())
}

/// Fold an ordered event stream into an aggregate.
///
/// [`EventError`](crate::event::EventError) envelopes are silently
/// skipped; the first hard failure stops the fold and is returned.
pub fn load(
    aggregate: &mut dyn AggregateRoot,
    envelopes: &[EventEnvelope],
) -> Result<(), CoreError> {
    for envelope in envelopes {
        if envelope.is_event_error() {
            continue;
        }
        raise_event(aggregate, envelope)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::event::{EVENT_ERROR_TYPE, Event};

    struct Counter {
        base: AggregateBase,
        total: i64,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                base: AggregateBase::new("counter"),
                total: 0,
            }
        }
    }

    impl AggregateRoot for Counter {
        fn base(&self) -> &AggregateBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut AggregateBase {
            &mut self.base
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn state_json(&self) -> Result<serde_json::Value, serde_json::Error> {
            Ok(serde_json::json!({ "total": self.total }))
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Added {
        amount: i64,
    }

    impl Event for Added {
        fn event_type(&self) -> &'static str {
            "Added"
        }

        fn apply(&self, aggregate: &mut dyn AggregateRoot) -> Result<(), CoreError> {
            let counter = aggregate
                .as_any_mut()
                .downcast_mut::<Counter>()
                .ok_or_else(|| CoreError::InvalidAggregate("expected Counter".into()))?;
            counter.total += self.amount;
            Ok(())
        }

        fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
            serde_json::to_value(self)
        }
    }

    struct Other {
        base: AggregateBase,
    }

    impl AggregateRoot for Other {
        fn base(&self) -> &AggregateBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut AggregateBase {
            &mut self.base
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn state_json(&self) -> Result<serde_json::Value, serde_json::Error> {
            Ok(serde_json::Value::Null)
        }
    }

    fn envelope(version: u64, amount: i64) -> EventEnvelope {
        EventEnvelope {
            id: format!("ev-{version}"),
            aggregate_id: "counter-1".into(),
            event_type: "Added".into(),
            version,
            event: Some(Box::new(Added { amount })),
        }
    }

    #[test]
    fn raise_applies_event_and_advances_version() {
        let mut counter = Counter::new();
        raise_event(&mut counter, &envelope(1, 5)).unwrap();
        assert_eq!(counter.version(), 1);
        assert_eq!(counter.total, 5);
    }

    #[test]
    fn raise_rejects_stale_version() {
        let mut counter = Counter::new();
        raise_event(&mut counter, &envelope(3, 1)).unwrap();
        let err = raise_event(&mut counter, &envelope(3, 1)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::DuplicateEvent {
                event_version: 3,
                aggregate_version: 3
            }
        ));
        let err = raise_event(&mut counter, &envelope(2, 1)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateEvent { .. }));
    }

    #[test]
    fn raise_rejects_missing_payload() {
        let mut counter = Counter::new();
        let env = EventEnvelope {
            id: "ev-1".into(),
            aggregate_id: "counter-1".into(),
            event_type: "Added".into(),
            version: 1,
            event: None,
        };
        assert!(matches!(
            raise_event(&mut counter, &env),
            Err(CoreError::InvalidEvent(_))
        ));
    }

    #[test]
    fn raise_rejects_zero_version() {
        let mut counter = Counter::new();
        assert!(matches!(
            raise_event(&mut counter, &envelope(0, 1)),
            Err(CoreError::InvalidEvent(_))
        ));
    }

    #[test]
    fn raise_rejects_wrong_concrete_aggregate() {
        let mut other = Other {
            base: AggregateBase::new("other"),
        };
        let err = raise_event(&mut other, &envelope(1, 1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidAggregate(_)));
        // A failed application must not advance the version.
        assert_eq!(other.version(), 0);
    }

    #[test]
    fn load_folds_ordered_stream() {
        let mut counter = Counter::new();
        let stream = vec![envelope(1, 1), envelope(2, 10), envelope(3, 100)];
        load(&mut counter, &stream).unwrap();
        assert_eq!(counter.version(), 3);
        assert_eq!(counter.total, 111);
    }

    #[test]
    fn load_skips_event_error_sentinels() {
        let mut counter = Counter::new();
        let error_env = EventEnvelope {
            id: "ev-2".into(),
            aggregate_id: "counter-1".into(),
            event_type: EVENT_ERROR_TYPE.into(),
            version: 2,
            event: None,
        };
        let stream = vec![envelope(1, 1), error_env, envelope(3, 10)];
        load(&mut counter, &stream).unwrap();
        // The sentinel occupies version 2 but leaves state untouched.
        assert_eq!(counter.version(), 3);
        assert_eq!(counter.total, 11);
    }

    #[test]
    fn load_stops_at_first_hard_failure() {
        let mut counter = Counter::new();
        let stream = vec![envelope(1, 1), envelope(1, 50), envelope(2, 100)];
        let err = load(&mut counter, &stream).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateEvent { .. }));
        assert_eq!(counter.total, 1);
    }
}
