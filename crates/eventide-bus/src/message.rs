//! Bus message codec for command records.
//!
//! A command record travels the bus as its JSON serialization, keyed by
//! the aggregate id so the broker keeps per-aggregate ordering at the
//! partition level.

use chrono::{DateTime, Utc};
use eventide_core::CommandRecord;

use crate::error::BusError;

/// A raw message on the command topic.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Partition key; the aggregate id for command records.
    pub key: String,
    /// Serialized payload.
    pub data: Vec<u8>,
    /// Broker timestamp, if the transport provides one.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Serialize a command record into a bus message keyed by aggregate id.
pub fn command_record_to_message(record: &CommandRecord) -> Result<BusMessage, BusError> {
    Ok(BusMessage {
        key: record.aggregate_id.clone(),
        data: serde_json::to_vec(record)?,
        timestamp: Some(record.created_at),
    })
}

/// Decode a bus message back into a command record.
///
/// The broker timestamp wins over the serialized `created_at`; a message
/// without one is stamped with the current time.
pub fn message_to_command_record(message: &BusMessage) -> Result<CommandRecord, BusError> {
    let mut record: CommandRecord = serde_json::from_slice(&message.data)?;
    record.created_at = message.timestamp.unwrap_or_else(Utc::now);
    Ok(record)
}
