//! Commands and events of the todo domain.

use async_trait::async_trait;
use eventide_core::{AggregateRoot, Command, CommandContext, CoreError, Event};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::aggregate::{TodoAggregate, load_todo_aggregate};
use crate::todo::TodoStatus;

fn require_uuid(id: &str) -> Result<(), CoreError> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| CoreError::InvalidCommand(format!("id {id:?} is not a UUID")))
}

fn downcast(aggregate: &mut dyn AggregateRoot) -> Result<&mut TodoAggregate, CoreError> {
    aggregate
        .as_any_mut()
        .downcast_mut::<TodoAggregate>()
        .ok_or_else(|| CoreError::InvalidAggregate("expected TodoAggregate".into()))
}

/// Create a new todo.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTodo {
    /// The todo's id; becomes the aggregate key.
    pub id: String,
    /// Short description.
    #[validate(length(min = 1, max = 140))]
    pub title: String,
}

#[async_trait]
impl Command for CreateTodo {
    fn command_type(&self) -> &'static str {
        "CreateTodo"
    }

    fn aggregate_key(&self) -> String {
        self.id.clone()
    }

    fn validate(&self) -> Result<(), CoreError> {
        Validate::validate(self).map_err(|e| CoreError::InvalidCommand(e.to_string()))?;
        require_uuid(&self.id)
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    async fn handle(&self, _ctx: &CommandContext<'_>) -> anyhow::Result<Vec<Box<dyn Event>>> {
        Ok(vec![Box::new(TodoCreated {
            id: self.id.clone(),
            title: self.title.clone(),
        })])
    }
}

/// A todo came into existence.
#[derive(Debug, Serialize, Deserialize)]
pub struct TodoCreated {
    /// The todo's id.
    pub id: String,
    /// Short description.
    pub title: String,
}

impl Event for TodoCreated {
    fn event_type(&self) -> &'static str {
        "TodoCreated"
    }

    fn apply(&self, aggregate: &mut dyn AggregateRoot) -> Result<(), CoreError> {
        let agg = downcast(aggregate)?;
        agg.todo.id.clone_from(&self.id);
        agg.todo.title.clone_from(&self.title);
        agg.todo.status = TodoStatus::Open;
        Ok(())
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Move a todo between open and completed.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateTodoStatus {
    /// The todo's id; becomes the aggregate key.
    pub id: String,
    /// The requested status.
    pub status: TodoStatus,
}

#[async_trait]
impl Command for UpdateTodoStatus {
    fn command_type(&self) -> &'static str {
        "UpdateTodoStatus"
    }

    fn aggregate_key(&self) -> String {
        self.id.clone()
    }

    fn validate(&self) -> Result<(), CoreError> {
        require_uuid(&self.id)
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> anyhow::Result<Vec<Box<dyn Event>>> {
        let mut aggregate = load_todo_aggregate(ctx).await?;
        aggregate
            .todo
            .update_status(self.status)
            .map_err(anyhow::Error::msg)?;
        Ok(vec![Box::new(TodoStatusUpdated {
            id: self.id.clone(),
            status: self.status,
        })])
    }
}

/// A todo's status changed.
#[derive(Debug, Serialize, Deserialize)]
pub struct TodoStatusUpdated {
    /// The todo's id.
    pub id: String,
    /// The status after the change.
    pub status: TodoStatus,
}

impl Event for TodoStatusUpdated {
    fn event_type(&self) -> &'static str {
        "TodoStatusUpdated"
    }

    fn apply(&self, aggregate: &mut dyn AggregateRoot) -> Result<(), CoreError> {
        let agg = downcast(aggregate)?;
        agg.todo
            .update_status(self.status)
            .map_err(CoreError::InvalidEvent)
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
