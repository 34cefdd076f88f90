//! Error types for the persistence layer.
//!
//! All store operations propagate [`StoreError`], which wraps the
//! underlying [`sqlx`] errors with the store-level failure modes the
//! engine reacts to -- most importantly
//! [`StoreError::WrongExpectedVersion`], the optimistic-concurrency
//! conflict that leaves a command pending for a later tick.

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The version compare-and-swap matched zero rows: another writer
    /// advanced the aggregate since the expected version was read. The
    /// enclosing transaction is rolled back.
    #[error("wrong expected version")]
    WrongExpectedVersion,

    /// No command record exists with the given id.
    #[error("command {0} not found")]
    CommandNotFound(String),

    /// No subscription cursor exists for the given group.
    #[error("subscription {0} not found")]
    SubscriptionNotFound(String),

    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
