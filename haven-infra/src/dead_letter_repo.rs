use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_domain::{DeadLetter, DeadLetterStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::backend;

pub struct PostgresDeadLetterStore {
    pool: PgPool,
}

impl PostgresDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DeadLetterRow {
    id: Uuid,
    topic: String,
    message_key: Option<String>,
    partition_id: i32,
    message_offset: i64,
    payload: String,
    error: String,
    attempts: i32,
    failed_at: DateTime<Utc>,
}

impl From<DeadLetterRow> for DeadLetter {
    fn from(row: DeadLetterRow) -> Self {
        DeadLetter {
            id: row.id,
            topic: row.topic,
            message_key: row.message_key,
            partition: row.partition_id,
            offset: row.message_offset,
            payload: row.payload,
            error: row.error,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            failed_at: row.failed_at,
        }
    }
}

#[async_trait]
impl DeadLetterStore for PostgresDeadLetterStore {
    async fn record(&self, letter: &DeadLetter) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO dead_letters (id, topic, message_key, partition_id, message_offset, payload, error, attempts, failed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(letter.id)
        .bind(&letter.topic)
        .bind(&letter.message_key)
        .bind(letter.partition)
        .bind(letter.offset)
        .bind(&letter.payload)
        .bind(&letter.error)
        .bind(i32::try_from(letter.attempts).unwrap_or(i32::MAX))
        .bind(letter.failed_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn list(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(
            r#"
            SELECT id, topic, message_key, partition_id, message_offset, payload, error, attempts, failed_at
            FROM dead_letters
            ORDER BY failed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(DeadLetter::from).collect())
    }
}
