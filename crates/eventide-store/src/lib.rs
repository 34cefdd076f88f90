//! Event/command persistence for the Eventide engine.
//!
//! The [`EventStore`] trait is the persistence contract the rest of the
//! engine programs against: durable command queueing, optimistic-concurrency
//! event storage, aggregate version anchoring, and subscription cursors.
//!
//! Two implementations are provided:
//!
//! - [`postgres::PostgresStore`] -- the relational implementation with
//!   transactional compare-and-swap semantics (the production store)
//! - [`memory::MemoryStore`] -- an in-process implementation with the same
//!   semantics, for tests and examples
//!
//! # Modules
//!
//! - [`store`] -- the [`EventStore`] contract
//! - [`postgres`] -- `PostgreSQL` pool, migrations, and store
//! - [`memory`] -- in-process store
//! - [`dispatcher`] -- store-backed command dispatcher
//! - [`error`] -- shared error types

pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod postgres;
mod queries;
pub mod store;

pub use dispatcher::StoreCommandDispatcher;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::{PostgresStore, PostgresStoreConfig};
pub use store::EventStore;
