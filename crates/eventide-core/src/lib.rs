//! Domain-agnostic core of the Eventide event-sourcing engine.
//!
//! This crate holds everything the execution engine needs to stay generic
//! over concrete domains:
//!
//! - [`aggregate`] -- the replay/mutation engine ([`raise_event`], [`load`])
//!   and the [`AggregateRoot`] capability set
//! - [`command`] -- the [`Command`] capability trait, the mutable
//!   [`CommandEnvelope`], and command preparation
//! - [`event`] -- the [`Event`] capability trait, replay envelopes, and the
//!   [`EventError`] sentinel
//! - [`record`] -- the persisted [`CommandRecord`] / [`EventRecord`]
//!   envelopes and the [`Subscription`] cursor
//! - [`registry`] -- the string-keyed type [`Registry`] mapping type names
//!   to typed constructors
//! - [`dispatcher`] -- the [`CommandDispatcher`] contract shared by the
//!   store-backed and bus-backed ingress paths
//! - [`hash`] -- the deterministic 31-bit partition hash
//! - [`error`] -- the [`CoreError`] taxonomy
//!
//! Concrete domains register their command and event types in a
//! [`Registry`] at startup; from then on the engine round-trips them
//! through JSON payloads without compile-time knowledge of the domain.

pub mod aggregate;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod hash;
pub mod ids;
pub mod record;
pub mod registry;

pub use aggregate::{AggregateBase, AggregateFactory, AggregateRoot, load, raise_event};
pub use command::{
    AggregateLoader, Command, CommandContext, CommandEnvelope, CommandRequest, command_to_record,
    parse_command_request, prepare,
};
pub use dispatcher::{CommandDispatcher, DispatchError};
pub use error::CoreError;
pub use event::{
    EVENT_ERROR_TYPE, Event, EventEnvelope, EventError, event_to_record, record_to_envelope,
    records_to_envelopes,
};
pub use hash::{fnv1a_32, partition_hash};
pub use ids::time_ordered_id;
pub use record::{CommandRecord, EventRecord, STATUS_FINISHED, Subscription};
pub use registry::{CommandCtor, EventCtor, Registry};
