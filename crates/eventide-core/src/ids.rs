//! Time-ordered record identifiers.

use uuid::Uuid;

/// Generate a time-sortable unique id for commands and events.
///
/// UUIDv7 places a millisecond timestamp in the most significant bits, so
/// the canonical string form sorts lexically by creation time. Processing
/// order can therefore default to insertion order by sorting on id.
pub fn time_ordered_id() -> String {
    Uuid::now_v7().to_string()
}
