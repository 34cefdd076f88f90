//! Per-domain route assembly.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use eventide_core::{AggregateFactory, CommandDispatcher, Registry};
use eventide_store::EventStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Everything the domain endpoints need, shared across requests.
pub struct DomainContext {
    /// The domain name, used as the route prefix.
    pub domain: String,
    /// Read access to commands and events.
    pub store: Arc<dyn EventStore>,
    /// Typed constructors for the domain's commands and events.
    pub registry: Arc<Registry>,
    /// Write-side ingress for posted commands.
    pub dispatcher: Arc<dyn CommandDispatcher>,
    /// Fresh-aggregate constructor for the fold endpoint.
    pub aggregate_factory: AggregateFactory,
}

/// Build the router for one domain.
///
/// Routes (for domain `todo`):
/// - `GET /health` -- liveness probe
/// - `POST /todo/commands` -- dispatch a command, returns its id
/// - `GET /todo/commands/{command_id}` -- fetch a command record
/// - `GET /todo/events/{aggregate_id}` -- an aggregate's event stream
/// - `GET /todo/aggregates/{aggregate_id}` -- fold and return state
///
/// CORS is open for development use; restrict it at the edge in
/// production.
pub fn domain_router(ctx: Arc<DomainContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let domain = ctx.domain.clone();
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            &format!("/{domain}/commands"),
            post(handlers::post_command),
        )
        .route(
            &format!("/{domain}/commands/{{command_id}}"),
            get(handlers::get_command),
        )
        .route(
            &format!("/{domain}/events/{{aggregate_id}}"),
            get(handlers::get_events),
        )
        .route(
            &format!("/{domain}/aggregates/{{aggregate_id}}"),
            get(handlers::get_aggregate),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
