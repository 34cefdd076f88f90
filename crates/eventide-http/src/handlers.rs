//! Endpoint handlers for the domain routes.
//!
//! Each handler is a thin call into the store, registry, or dispatcher
//! contracts; the engine itself stays behind those seams.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use eventide_core::{
    AggregateRoot, CommandDispatcher, CommandRecord, CommandRequest, EventRecord, load,
    parse_command_request, records_to_envelopes,
};
use eventide_store::EventStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::router::DomainContext;

/// Response to a posted command: the id to poll for completion.
#[derive(Debug, Serialize)]
pub struct PostCommandResponse {
    /// The dispatched command's id.
    pub id: String,
}

/// An aggregate folded from its event stream.
#[derive(Debug, Serialize)]
pub struct AggregateResponse {
    /// The aggregate id.
    pub id: String,
    /// The replay version the state corresponds to.
    pub version: u64,
    /// The domain state.
    pub state: serde_json::Value,
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /{domain}/commands` -- parse, prepare, and dispatch a command.
pub async fn post_command(
    State(ctx): State<Arc<DomainContext>>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<PostCommandResponse>, ApiError> {
    let envelope = parse_command_request(&ctx.registry, &request)?;
    let id = ctx.dispatcher.dispatch(envelope).await?;
    Ok(Json(PostCommandResponse { id }))
}

/// `GET /{domain}/commands/{command_id}` -- fetch one command record.
pub async fn get_command(
    State(ctx): State<Arc<DomainContext>>,
    Path(command_id): Path<String>,
) -> Result<Json<CommandRecord>, ApiError> {
    if command_id.is_empty() {
        return Err(ApiError::BadRequest("command id is required".into()));
    }
    let record = ctx.store.get_command(&command_id).await?;
    Ok(Json(record))
}

/// `GET /{domain}/events/{aggregate_id}` -- an aggregate's event stream.
pub async fn get_events(
    State(ctx): State<Arc<DomainContext>>,
    Path(aggregate_id): Path<String>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
    if aggregate_id.is_empty() {
        return Err(ApiError::BadRequest("aggregate id is required".into()));
    }
    let events = ctx.store.load_events(&aggregate_id).await?;
    Ok(Json(events))
}

/// `GET /{domain}/aggregates/{aggregate_id}` -- fold and return state.
pub async fn get_aggregate(
    State(ctx): State<Arc<DomainContext>>,
    Path(aggregate_id): Path<String>,
) -> Result<Json<AggregateResponse>, ApiError> {
    if aggregate_id.is_empty() {
        return Err(ApiError::BadRequest("aggregate id is required".into()));
    }
    let records = ctx.store.load_events(&aggregate_id).await?;
    if records.is_empty() {
        return Err(ApiError::NotFound(format!(
            "aggregate {aggregate_id} has no events"
        )));
    }
    let envelopes = records_to_envelopes(&ctx.registry, &records)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut aggregate = (ctx.aggregate_factory)();
    load(aggregate.as_mut(), &envelopes).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(AggregateResponse {
        id: aggregate_id,
        version: aggregate.version(),
        state: aggregate.state_json()?,
    }))
}
