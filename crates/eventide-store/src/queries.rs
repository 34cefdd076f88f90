//! SQL statements for the `PostgreSQL` store.
//!
//! All queries are parameterized and constructed at runtime (no
//! compile-time database). Batch inserts use UNNEST arrays to keep
//! round-trips to one statement per batch.

/// Bulk-insert command records; duplicates are dropped silently and only
/// the ids actually inserted come back.
pub const SAVE_COMMANDS: &str = r"
INSERT INTO commands (id, aggregate_id, event_type, data, created_at, aggregate_hash)
SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::JSONB[], $5::TIMESTAMPTZ[], $6::INT[])
ON CONFLICT (id) DO NOTHING
RETURNING id";

/// Fetch one command by id.
pub const GET_COMMAND: &str = r"
SELECT id, aggregate_id, event_type, data, created_at, aggregate_hash, status
FROM commands
WHERE id = $1";

/// Select pending commands partitioned into lanes by
/// `aggregate_hash mod $1`, at most `$2` per lane, ordered by id within
/// each lane.
pub const SELECT_FOR_PROCESSING: &str = r"
WITH pending AS (
    SELECT id, aggregate_id, event_type, data, created_at, aggregate_hash, status,
           MOD(aggregate_hash, $1) AS lane,
           ROW_NUMBER() OVER (PARTITION BY MOD(aggregate_hash, $1) ORDER BY id ASC) AS rn
    FROM commands
    WHERE status IS NULL
)
SELECT id, aggregate_id, event_type, data, created_at, aggregate_hash, status, lane
FROM pending
WHERE rn <= $2
ORDER BY lane, id";

/// The optimistic-concurrency anchor: advance the aggregate version by
/// the event count only if it still matches the expected version.
pub const CHECK_VERSION: &str = r"
UPDATE aggregate_versions
SET version = version + $1
WHERE aggregate_id = $2 AND version = $3";

/// Append events to the log.
pub const SAVE_EVENTS: &str = r"
INSERT INTO events (id, command_id, aggregate_id, version, event_type, data, created_at)
SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::BIGINT[], $5::TEXT[], $6::JSONB[], $7::TIMESTAMPTZ[])";

/// Flip a command's status.
pub const UPDATE_COMMAND_STATUS: &str = r"
UPDATE commands
SET status = $1
WHERE id = $2";

/// Insert-if-absent for the per-aggregate version row, returning the
/// current version either way.
pub const GET_OR_CREATE_VERSION: &str = r"
WITH ins AS (
    INSERT INTO aggregate_versions (aggregate_id, version)
    VALUES ($1, 0)
    ON CONFLICT (aggregate_id) DO NOTHING
    RETURNING version
)
SELECT version FROM ins
UNION
SELECT version FROM aggregate_versions WHERE aggregate_id = $1";

/// Insert-if-absent for a subscription cursor, returning its current
/// state either way.
pub const INSERT_SUBSCRIPTION: &str = r"
WITH ins AS (
    INSERT INTO subscriptions (subscription_group)
    VALUES ($1)
    ON CONFLICT (subscription_group) DO NOTHING
    RETURNING subscription_group, COALESCE(last_event_id, '') AS last_event_id, updated_at
)
SELECT subscription_group, last_event_id, updated_at FROM ins
UNION
SELECT subscription_group, COALESCE(last_event_id, ''), updated_at
FROM subscriptions
WHERE subscription_group = $1";

/// Select events after a subscription's cursor, excluding the failure
/// sentinel, in global `(id, version)` order.
pub const SELECT_EVENTS_FOR_SUBSCRIPTION: &str = r"
SELECT id, command_id, aggregate_id, event_type, version, data, created_at
FROM events
WHERE id > (SELECT COALESCE(last_event_id, '') FROM subscriptions WHERE subscription_group = $1)
  AND event_type <> $2
ORDER BY id, version ASC
LIMIT $3";

/// Advance a subscription cursor.
pub const UPDATE_SUBSCRIPTION: &str = r"
UPDATE subscriptions
SET last_event_id = $2, updated_at = NOW()
WHERE subscription_group = $1
RETURNING subscription_group, COALESCE(last_event_id, '') AS last_event_id, updated_at";

/// Load an aggregate's full replay stream, excluding the failure
/// sentinel.
pub const LOAD_EVENTS: &str = r"
SELECT id, command_id, aggregate_id, event_type, version, data, created_at
FROM events
WHERE aggregate_id = $1
  AND event_type <> $2
ORDER BY id, version ASC";
