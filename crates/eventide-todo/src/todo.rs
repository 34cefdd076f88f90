//! The todo state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a todo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoStatus {
    /// Not yet done.
    #[default]
    Open,
    /// Done.
    Completed,
}

impl std::fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A todo item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// The todo's id (the aggregate's local id).
    pub id: String,
    /// Short description.
    pub title: String,
    /// Current lifecycle state.
    pub status: TodoStatus,
}

impl Todo {
    /// Create an empty todo with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            status: TodoStatus::Open,
        }
    }

    /// Transition to a new status.
    ///
    /// Only `open -> completed` and `completed -> open` are legal; a
    /// same-state transition is an error.
    pub fn update_status(&mut self, status: TodoStatus) -> Result<(), String> {
        match (self.status, status) {
            (TodoStatus::Open, TodoStatus::Completed)
            | (TodoStatus::Completed, TodoStatus::Open) => {
                self.status = status;
                Ok(())
            }
            (from, to) => Err(format!("invalid status transition from {from} to {to}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn open_completes_and_reopens() {
        let mut todo = Todo::new("1");
        todo.update_status(TodoStatus::Completed).unwrap();
        assert_eq!(todo.status, TodoStatus::Completed);
        todo.update_status(TodoStatus::Open).unwrap();
        assert_eq!(todo.status, TodoStatus::Open);
    }

    #[test]
    fn same_state_transitions_are_rejected() {
        let mut todo = Todo::new("1");
        let err = todo.update_status(TodoStatus::Open).unwrap_err();
        assert_eq!(err, "invalid status transition from open to open");

        todo.update_status(TodoStatus::Completed).unwrap();
        let err = todo.update_status(TodoStatus::Completed).unwrap_err();
        assert_eq!(err, "invalid status transition from completed to completed");
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TodoStatus::Completed).unwrap(),
            serde_json::json!("completed")
        );
    }
}
