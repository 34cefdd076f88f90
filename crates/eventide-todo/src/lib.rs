//! Sample "todo" domain for the Eventide engine.
//!
//! A deliberately small domain showing what a real one looks like: a
//! [`Todo`] state machine, an aggregate embedding the shared base, two
//! command/event pairs, registry wiring, and a `PostgreSQL` projection
//! consuming the event log.
//!
//! # Modules
//!
//! - [`todo`] -- the domain state machine
//! - [`aggregate`] -- the replayable aggregate
//! - [`commands`] -- command and event types
//! - [`register`] -- registry wiring
//! - [`projection`] -- the `todos` read model
//! - [`config`] -- server configuration

pub mod aggregate;
pub mod commands;
pub mod config;
pub mod projection;
pub mod register;
pub mod todo;

/// The domain name; aggregate ids are `"todo-<uuid>"`.
pub const DOMAIN: &str = "todo";

/// The bus topic commands are published on when bus ingress is enabled.
pub const COMMAND_TOPIC: &str = "commands.todo";

pub use aggregate::{TodoAggregate, load_todo_aggregate};
pub use commands::{CreateTodo, TodoCreated, TodoStatusUpdated, UpdateTodoStatus};
pub use config::AppConfig;
pub use projection::TodoProjection;
pub use register::register;
pub use todo::{Todo, TodoStatus};
