//! Persisted envelopes for commands, events, and subscription cursors.
//!
//! Records are the wire and storage representation: identity columns plus
//! an opaque JSON payload. The [`crate::registry::Registry`] turns payloads
//! back into typed commands and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a processed command. A command with no status is
/// pending; the processor flips it to finished in the same transaction
/// that persists its events.
pub const STATUS_FINISHED: &str = "finished";

/// The persisted envelope of a dispatched command.
///
/// Created by dispatch, mutated only by the processor (pending to
/// finished), never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Time-sortable unique command id.
    pub id: String,
    /// The target aggregate, formatted `"<domain>-<local-id>"`.
    pub aggregate_id: String,
    /// Registered type name of the command.
    pub event_type: String,
    /// JSON payload of the typed command.
    pub data: serde_json::Value,
    /// Dispatch timestamp (UTC).
    pub created_at: DateTime<Utc>,
    /// Non-negative 31-bit partition key of the aggregate id.
    pub aggregate_hash: i32,
    /// `None` while pending, `Some("finished")` once processed.
    pub status: Option<String>,
}

impl CommandRecord {
    /// Whether the command is still awaiting processing.
    pub const fn is_pending(&self) -> bool {
        self.status.is_none()
    }
}

/// The persisted envelope of an event. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Time-sortable unique event id.
    pub id: String,
    /// Id of the command whose execution produced this event.
    pub command_id: String,
    /// The aggregate this event belongs to.
    pub aggregate_id: String,
    /// Registered type name of the event.
    pub event_type: String,
    /// Position in the aggregate's stream (1-based, contiguous).
    pub version: u64,
    /// JSON payload of the typed event.
    pub data: serde_json::Value,
    /// Persistence timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

/// Cursor of one named projection consumer over the global event log.
///
/// `last_seen_event_id` is monotonic: it only advances after the
/// subscriber's publisher has acknowledged the batch ending at that id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Name of the consumer group (one cursor per projection).
    pub group: String,
    /// Id of the last event successfully published, empty if none yet.
    pub last_seen_event_id: String,
    /// When the cursor last advanced (UTC).
    pub last_updated_at: DateTime<Utc>,
}
