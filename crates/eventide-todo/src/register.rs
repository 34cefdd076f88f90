//! Registry wiring for the todo domain.

use eventide_core::Registry;

use crate::commands::{CreateTodo, TodoCreated, TodoStatusUpdated, UpdateTodoStatus};

/// Register every todo command and event type.
///
/// Must run once at startup before the processor, subscriber, or HTTP
/// endpoints touch todo records.
pub fn register(registry: &Registry) {
    registry.register_command::<CreateTodo>("CreateTodo");
    registry.register_event::<TodoCreated>("TodoCreated");

    registry.register_command::<UpdateTodoStatus>("UpdateTodoStatus");
    registry.register_event::<TodoStatusUpdated>("TodoStatusUpdated");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use eventide_core::Registry;

    use super::*;

    #[test]
    fn all_types_are_registered() {
        let registry = Registry::new();
        register(&registry);
        assert!(registry.command("CreateTodo").is_some());
        assert!(registry.command("UpdateTodoStatus").is_some());
        assert!(registry.event("TodoCreated").is_some());
        assert!(registry.event("TodoStatusUpdated").is_some());
    }

    #[test]
    fn registered_constructor_builds_a_typed_command() {
        let registry = Registry::new();
        register(&registry);
        let ctor = registry.command("CreateTodo").unwrap();
        let command = ctor(&serde_json::json!({
            "id": "8f6e38b2-9a3f-4d2e-8a2e-0c1c6c5d7e9f",
            "title": "Buy milk"
        }))
        .unwrap();
        assert_eq!(command.aggregate_key(), "8f6e38b2-9a3f-4d2e-8a2e-0c1c6c5d7e9f");
    }
}
