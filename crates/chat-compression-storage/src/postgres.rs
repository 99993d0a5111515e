//! PostgreSQL summary store

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use chat_compression_core::{CompressionError, ConversationSummary, Result, SummaryStore};

use crate::clock::MonotonicClock;

type SummaryRow = (i64, String, String, i64, DateTime<Utc>, DateTime<Utc>);

// Older tables use INTEGER counters and TIMESTAMP without time zone, so
// every read widens to BIGINT and TIMESTAMPTZ. Naive values are UTC because
// each session runs with `TimeZone=UTC`.
const SELECT_COLUMNS: &str = "id::BIGINT, chat_id, summary, \
     COALESCE(compressed_message_count, 0)::BIGINT, created_at::TIMESTAMPTZ, updated_at::TIMESTAMPTZ";

fn map_sqlx_err(e: sqlx::Error) -> CompressionError {
    CompressionError::Persistence(e.to_string())
}

fn row_to_summary(
    (id, chat_id, summary, compressed_message_count, created_at, updated_at): SummaryRow,
) -> ConversationSummary {
    ConversationSummary {
        id: Some(id),
        chat_id,
        summary,
        compressed_message_count,
        created_at,
        updated_at,
    }
}

pub struct PostgresSummaryStore {
    pool: PgPool,
    clock: MonotonicClock,
}

impl PostgresSummaryStore {
    pub async fn new(url: &str) -> Result<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(map_sqlx_err)?
            .options([("TimeZone", "UTC")]);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .test_before_acquire(true)
            .max_lifetime(std::time::Duration::from_secs(3600))
            .connect_with(options)
            .await
            .map_err(map_sqlx_err)?;

        let store = Self {
            pool,
            clock: MonotonicClock::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_summary (
                id BIGSERIAL PRIMARY KEY,
                chat_id VARCHAR(255) NOT NULL UNIQUE,
                summary TEXT NOT NULL,
                compressed_message_count BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_chat_summary_updated_at ON chat_summary(updated_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }
}

#[async_trait]
impl SummaryStore for PostgresSummaryStore {
    async fn load(&self, chat_id: &str) -> Result<Option<ConversationSummary>> {
        let row: Option<SummaryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM chat_summary WHERE chat_id = $1",
            SELECT_COLUMNS
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.map(row_to_summary))
    }

    async fn save(&self, chat_id: &str, summary: &str, message_count: usize) -> Result<()> {
        let now = self.clock.now();

        sqlx::query(
            r#"
            INSERT INTO chat_summary (chat_id, summary, compressed_message_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (chat_id) DO UPDATE SET
                summary = EXCLUDED.summary,
                compressed_message_count = EXCLUDED.compressed_message_count,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(chat_id)
        .bind(summary)
        .bind(message_count as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn delete(&self, chat_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chat_summary WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM chat_summary ORDER BY updated_at DESC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows.into_iter().map(row_to_summary).collect())
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }

    async fn expire_before(&self, before: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chat_summary WHERE updated_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() as usize)
    }
}
