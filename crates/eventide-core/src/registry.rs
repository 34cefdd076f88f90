//! String-keyed type registry mapping type names to typed constructors.
//!
//! The registry is what keeps the engine domain-agnostic: domains register
//! their command and event types once at startup, and from then on the
//! processor, subscriber, and HTTP endpoints reconstruct typed values from
//! persisted JSON payloads by name. Registration is rare; lookup is the
//! hot path, so both maps sit behind a reader/writer lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use crate::command::Command;
use crate::error::CoreError;
use crate::event::Event;

/// Constructor turning a JSON payload into a typed command.
pub type CommandCtor =
    Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn Command>, CoreError> + Send + Sync>;

/// Constructor turning a JSON payload into a typed event.
pub type EventCtor =
    Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn Event>, CoreError> + Send + Sync>;

/// Thread-safe mapping from type name to (de)serialization constructors.
#[derive(Default)]
pub struct Registry {
    commands: RwLock<HashMap<String, CommandCtor>>,
    events: RwLock<HashMap<String, EventCtor>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command type under `name`.
    ///
    /// The constructor deserializes the record payload into `C`.
    pub fn register_command<C>(&self, name: &str)
    where
        C: Command + DeserializeOwned + 'static,
    {
        self.register_command_ctor(
            name,
            Arc::new(|data| {
                let command: C = serde_json::from_value(data.clone())?;
                Ok(Box::new(command) as Box<dyn Command>)
            }),
        );
    }

    /// Register a command constructor under `name`, replacing any
    /// previous registration.
    pub fn register_command_ctor(&self, name: &str, ctor: CommandCtor) {
        let mut commands = self.commands.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        commands.insert(name.to_owned(), ctor);
    }

    /// Look up the constructor for a command type name.
    pub fn command(&self, name: &str) -> Option<CommandCtor> {
        let commands = self.commands.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        commands.get(name).cloned()
    }

    /// Register an event type under `name`.
    pub fn register_event<E>(&self, name: &str)
    where
        E: Event + DeserializeOwned + 'static,
    {
        self.register_event_ctor(
            name,
            Arc::new(|data| {
                let event: E = serde_json::from_value(data.clone())?;
                Ok(Box::new(event) as Box<dyn Event>)
            }),
        );
    }

    /// Register an event constructor under `name`, replacing any previous
    /// registration.
    pub fn register_event_ctor(&self, name: &str, ctor: EventCtor) {
        let mut events = self.events.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        events.insert(name.to_owned(), ctor);
    }

    /// Look up the constructor for an event type name.
    pub fn event(&self, name: &str) -> Option<EventCtor> {
        let events = self.events.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        events.get(name).cloned()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let commands = self.commands.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let events = self.events.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        f.debug_struct("Registry")
            .field("commands", &commands.len())
            .field("events", &events.len())
            .finish()
    }
}
