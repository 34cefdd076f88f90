//! Execution engine for Eventide: command processing and projections.
//!
//! - [`processor`] -- the partitioned concurrent command processor: polls
//!   the store on a fixed tick, partitions pending commands into lanes by
//!   aggregate hash, executes lanes concurrently (each lane strictly
//!   sequential), and persists results under optimistic concurrency
//! - [`subscriber`] -- the polling subscriber that drives idempotent
//!   projections from the event log, at-least-once
//! - [`service`] -- the application service that runs every long-lived
//!   task (processor, subscribers, bus listeners, HTTP server) under one
//!   shutdown signal with first-error-cancels-rest semantics
//! - [`error`] -- shared error types

pub mod error;
pub mod processor;
pub mod service;
pub mod subscriber;

pub use error::EngineError;
pub use processor::CommandProcessor;
pub use service::Service;
pub use subscriber::{Publisher, Subscriber};
