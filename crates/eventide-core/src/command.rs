//! Command capability trait, the mutable envelope, and preparation.
//!
//! A command is a request to attempt a state change. Before it enters the
//! store it passes through [`prepare`], which assigns identity (id, event
//! type, aggregate id) and the partition hash, then enforces the envelope
//! invariants. Preparation is idempotent: fields that are already set are
//! never changed.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::aggregate::AggregateRoot;
use crate::error::CoreError;
use crate::event::Event;
use crate::hash::partition_hash;
use crate::ids::time_ordered_id;
use crate::record::CommandRecord;
use crate::registry::Registry;

/// Replay-on-demand capability handed to command handlers.
///
/// Implementations load the aggregate's full event stream and fold it
/// into the given aggregate before the handler inspects it.
#[async_trait]
pub trait AggregateLoader: Send + Sync {
    /// Load and fold the stream of `aggregate_id` into `aggregate`.
    async fn load(
        &self,
        aggregate_id: &str,
        aggregate: &mut dyn AggregateRoot,
    ) -> anyhow::Result<()>;
}

/// Execution context passed to a command handler.
pub struct CommandContext<'a> {
    /// The command's id.
    pub command_id: &'a str,
    /// The target aggregate id.
    pub aggregate_id: &'a str,
    /// Replay-on-demand loader.
    pub loader: &'a dyn AggregateLoader,
}

impl CommandContext<'_> {
    /// Load the target aggregate's current state into `aggregate`.
    pub async fn load(&self, aggregate: &mut dyn AggregateRoot) -> anyhow::Result<()> {
        self.loader.load(self.aggregate_id, aggregate).await
    }
}

/// Capability trait every domain command implements.
///
/// The aggregate key is an explicit method rather than runtime field
/// introspection: each command reports the local id of the aggregate it
/// targets, and preparation formats it as `"<domain>-<key>"`.
#[async_trait]
pub trait Command: Send + Sync {
    /// The registered type name, e.g. `"CreateTodo"`.
    fn command_type(&self) -> &'static str;

    /// The local id of the target aggregate.
    fn aggregate_key(&self) -> String;

    /// Structural validation, run before the command is persisted.
    fn validate(&self) -> Result<(), CoreError> {
        Ok(())
    }

    /// Serialize the command into its JSON payload.
    fn payload(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Execute the command, producing zero or more events.
    ///
    /// Failures are not propagated to the dispatcher: the processor
    /// records them durably as `EventError` sentinels.
    async fn handle(&self, ctx: &CommandContext<'_>) -> anyhow::Result<Vec<Box<dyn Event>>>;
}

/// A command plus the mutable identity filled in by [`prepare`].
pub struct CommandEnvelope {
    /// Time-sortable unique command id; assigned if empty.
    pub id: String,
    /// Target aggregate, `"<domain>-<local-id>"`; derived if empty.
    pub aggregate_id: String,
    /// Registered type name; defaulted from the command if empty.
    pub event_type: String,
    /// Non-negative 31-bit partition key; computed if zero.
    pub aggregate_hash: i32,
    /// The typed command.
    pub command: Box<dyn Command>,
}

impl CommandEnvelope {
    /// Wrap a command with empty identity, to be filled by [`prepare`].
    pub fn new(command: Box<dyn Command>) -> Self {
        Self {
            id: String::new(),
            aggregate_id: String::new(),
            event_type: String::new(),
            aggregate_hash: 0,
            command,
        }
    }
}

/// Normalize and validate a command envelope before persistence.
///
/// Runs the command's structural validation, then fills every empty
/// identity field: a fresh time-sortable id, the command's type name,
/// the aggregate id derived from the command's aggregate key, and the
/// deterministic partition hash of the aggregate id. Already-set fields
/// are left untouched, so preparing twice is a no-op.
///
/// # Errors
///
/// Returns [`CoreError::InvalidCommand`] when validation fails or the
/// resulting envelope violates the command invariants (empty id, empty
/// event type, malformed aggregate id, zero hash).
pub fn prepare(domain: &str, envelope: &mut CommandEnvelope) -> Result<(), CoreError> {
    envelope.command.validate()?;

    if envelope.id.is_empty() {
        envelope.id = time_ordered_id();
    }
    if envelope.event_type.is_empty() {
        envelope.event_type = envelope.command.command_type().to_owned();
    }
    if envelope.aggregate_id.is_empty() {
        let key = envelope.command.aggregate_key();
        if key.is_empty() {
            return Err(CoreError::InvalidCommand(
                "aggregate key is empty".into(),
            ));
        }
        envelope.aggregate_id = format!("{domain}-{key}");
    }
    if envelope.aggregate_hash == 0 {
        envelope.aggregate_hash = partition_hash(&envelope.aggregate_id);
    }

    validate_envelope(envelope)
}

/// Enforce the command envelope invariants.
fn validate_envelope(envelope: &CommandEnvelope) -> Result<(), CoreError> {
    if envelope.id.is_empty() {
        return Err(CoreError::InvalidCommand("command id is required".into()));
    }
    match envelope.aggregate_id.split_once('-') {
        Some((domain, local)) if !domain.is_empty() && !local.is_empty() => {}
        _ => {
            return Err(CoreError::InvalidCommand(format!(
                "aggregate id {:?} is not of the form <domain>-<local-id>",
                envelope.aggregate_id
            )));
        }
    }
    if envelope.aggregate_hash == 0 {
        return Err(CoreError::InvalidCommand(
            "aggregate hash is required".into(),
        ));
    }
    if envelope.event_type.is_empty() {
        return Err(CoreError::InvalidCommand("event type is required".into()));
    }
    Ok(())
}

/// Prepare a command and build its persisted record.
pub fn command_to_record(
    domain: &str,
    envelope: &mut CommandEnvelope,
) -> Result<CommandRecord, CoreError> {
    prepare(domain, envelope)?;
    Ok(CommandRecord {
        id: envelope.id.clone(),
        aggregate_id: envelope.aggregate_id.clone(),
        event_type: envelope.event_type.clone(),
        data: envelope.command.payload()?,
        created_at: Utc::now(),
        aggregate_hash: envelope.aggregate_hash,
        status: None,
    })
}

/// A client request naming a registered command type and its payload.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Registered command type name.
    pub name: String,
    /// JSON payload for the command constructor.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Maximum accepted length of a command type name in a request.
const MAX_COMMAND_NAME_LEN: usize = 100;

/// Turn a client request into a typed command envelope via the registry.
///
/// # Errors
///
/// Returns [`CoreError::InvalidCommand`] for empty/oversized names,
/// [`CoreError::UnregisteredCommand`] for unknown names, and
/// [`CoreError::Serialization`] for undecodable payloads.
pub fn parse_command_request(
    registry: &Registry,
    request: &CommandRequest,
) -> Result<CommandEnvelope, CoreError> {
    if request.name.is_empty() || request.name.len() > MAX_COMMAND_NAME_LEN {
        return Err(CoreError::InvalidCommand(format!(
            "command name length must be 1..={MAX_COMMAND_NAME_LEN}"
        )));
    }
    let ctor = registry
        .command(&request.name)
        .ok_or_else(|| CoreError::UnregisteredCommand(request.name.clone()))?;
    let command = ctor(&request.payload)?;
    let mut envelope = CommandEnvelope::new(command);
    envelope.event_type.clone_from(&request.name);
    Ok(envelope)
}
