//! HTTP surface for one Eventide domain.
//!
//! Thin axum endpoints over the store, registry, and dispatcher
//! contracts: post a command, read a command by id, read an aggregate's
//! event stream, and fold an aggregate's current state.
//!
//! # Modules
//!
//! - [`router`] -- per-domain route assembly
//! - [`handlers`] -- endpoint handlers
//! - [`server`] -- TCP listener with graceful shutdown
//! - [`error`] -- HTTP error mapping

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::{DomainContext, domain_router};
pub use server::{ServerConfig, ServerError, serve};
