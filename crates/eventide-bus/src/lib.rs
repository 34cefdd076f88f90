//! Message-bus command ingress for Eventide.
//!
//! The asynchronous path into the store: a dispatcher serializes command
//! records and publishes them keyed by aggregate id (so the bus preserves
//! per-aggregate ordering at the partition level), and a consumer group
//! drains the topic into the store with offset management, exponential
//! backoff, and commit-on-rebalance.
//!
//! The bus client itself is a collaborator behind the [`BusProducer`] /
//! [`BusConsumer`] traits: [`NatsProducer`] covers the produce path over
//! NATS, and [`MemoryBus`] is an in-process transport with full
//! partition/consumer-group semantics for tests and examples.
//!
//! # Modules
//!
//! - [`message`] -- bus message codec for command records
//! - [`transport`] -- producer/consumer transport contracts
//! - [`dispatcher`] -- bus-backed command dispatcher
//! - [`consumer`] -- consumer instances and the consumer group runner
//! - [`worker`] -- per-message work contract and the save-command worker
//! - [`nats`] -- NATS producer
//! - [`memory`] -- in-process bus transport
//! - [`error`] -- shared error types

pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod message;
pub mod nats;
pub mod transport;
pub mod worker;

pub use consumer::{Consumer, ConsumerConfig, run_consumer_group};
pub use dispatcher::BusDispatcher;
pub use error::BusError;
pub use memory::{MemoryBus, MemoryBusConsumer};
pub use message::{BusMessage, command_record_to_message, message_to_command_record};
pub use nats::NatsProducer;
pub use transport::{AckMode, BusConsumer, BusProducer, ConsumerEvent, IncomingMessage, PartitionId};
pub use worker::{SaveCommandWorker, Worker};
