//! The replayable todo aggregate.

use std::any::Any;

use eventide_core::{AggregateBase, AggregateRoot, CommandContext};

use crate::DOMAIN;
use crate::todo::Todo;

/// Todo aggregate: shared base plus the domain state.
#[derive(Debug, Default)]
pub struct TodoAggregate {
    base: AggregateBase,
    /// The folded todo state.
    pub todo: Todo,
}

impl TodoAggregate {
    /// Fresh, unloaded aggregate at version 0.
    pub fn new() -> Self {
        Self {
            base: AggregateBase::new(DOMAIN),
            todo: Todo::default(),
        }
    }
}

impl AggregateRoot for TodoAggregate {
    fn base(&self) -> &AggregateBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase {
        &mut self.base
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn state_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.todo)
    }
}

/// Load the current todo aggregate through the handler's replay-on-demand
/// capability.
pub async fn load_todo_aggregate(ctx: &CommandContext<'_>) -> anyhow::Result<TodoAggregate> {
    let mut aggregate = TodoAggregate::new();
    ctx.load(&mut aggregate).await?;
    Ok(aggregate)
}
