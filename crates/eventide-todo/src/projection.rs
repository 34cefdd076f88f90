//! `PostgreSQL` read model for todos.
//!
//! Consumes the event log through the subscriber and maintains a
//! queryable `todos` table. Writes are idempotent (upsert on create,
//! absolute status on update) so at-least-once redelivery is safe.

use async_trait::async_trait;
use eventide_core::EventRecord;
use eventide_engine::Publisher;
use sqlx::PgPool;
use tracing::warn;

use crate::commands::{TodoCreated, TodoStatusUpdated};

/// Builds the `todos` projection from the event stream.
pub struct TodoProjection {
    pool: PgPool,
}

impl TodoProjection {
    /// Create a projection writing through the given pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `todos` table if needed.
    ///
    /// Runs a plain idempotent statement rather than the store's
    /// migrator, so the read model can live in the same database as the
    /// event store without the two migration histories colliding.
    ///
    /// # Errors
    ///
    /// Returns the database error if schema setup fails.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"CREATE TABLE IF NOT EXISTS todos (
                id         TEXT PRIMARY KEY,
                title      TEXT        NOT NULL,
                status     TEXT        NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for TodoProjection {
    fn name(&self) -> &str {
        "todo_projection"
    }

    async fn publish(&self, events: &[EventRecord]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in events {
            match record.event_type.as_str() {
                "TodoCreated" => {
                    let event: TodoCreated = serde_json::from_value(record.data.clone())?;
                    sqlx::query(
                        r"INSERT INTO todos (id, title, status, created_at, updated_at)
                          VALUES ($1, $2, 'open', $3, $3)
                          ON CONFLICT (id) DO NOTHING",
                    )
                    .bind(&event.id)
                    .bind(&event.title)
                    .bind(record.created_at)
                    .execute(&mut *tx)
                    .await?;
                }
                "TodoStatusUpdated" => {
                    let event: TodoStatusUpdated = serde_json::from_value(record.data.clone())?;
                    sqlx::query(
                        r"UPDATE todos
                          SET status = $1, updated_at = $2
                          WHERE id = $3",
                    )
                    .bind(event.status.to_string())
                    .bind(record.created_at)
                    .bind(&event.id)
                    .execute(&mut *tx)
                    .await?;
                }
                other => {
                    warn!(event_type = other, event_id = %record.id, "unknown event");
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
