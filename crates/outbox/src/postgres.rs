//! PostgreSQL-backed outbox store.

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{EventId, OutboxError, OutboxEvent, OutboxStore, Result};

/// Outbox store persisting events to the `outbox_events` table.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Appends an event inside a caller-owned transaction, so the event row
    /// commits or rolls back together with the business mutation.
    pub async fn append_in_tx(
        &self,
        tx: &mut sqlx::PgConnection,
        event: &OutboxEvent,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events
                (id, event_type, aggregate_type, aggregate_id, payload,
                 processed, retry_count, error_message, created_at, last_attempt_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(&event.event_type)
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.payload)
        .bind(event.processed)
        .bind(event.retry_count as i32)
        .bind(&event.error_message)
        .bind(event.created_at)
        .bind(event.last_attempt_at)
        .bind(event.processed_at)
        .execute(tx)
        .await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            payload: row.try_get("payload")?,
            processed: row.try_get("processed")?,
            retry_count: row.try_get::<i32, _>("retry_count")? as u32,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            last_attempt_at: row.try_get("last_attempt_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn append(&self, event: OutboxEvent) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.append_in_tx(&mut *conn, &event).await
    }

    async fn fetch_unprocessed(&self, limit: usize, max_retries: u32) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_type, aggregate_id, payload,
                   processed, retry_count, error_message, created_at, last_attempt_at, processed_at
            FROM outbox_events
            WHERE processed = FALSE AND retry_count < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(max_retries as i32)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn mark_processed(&self, id: EventId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox_events SET processed = TRUE, processed_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::EventNotFound(id));
        }
        Ok(())
    }

    async fn record_failure(&self, id: EventId, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET retry_count = retry_count + 1, error_message = $2, last_attempt_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::EventNotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: EventId) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_type, aggregate_id, payload,
                   processed, retry_count, error_message, created_at, last_attempt_at, processed_at
            FROM outbox_events
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_event).transpose()
    }

    async fn dead_letter_count(&self, max_retries: u32) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outbox_events WHERE processed = FALSE AND retry_count >= $1",
        )
        .bind(max_retries as i32)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }
}
