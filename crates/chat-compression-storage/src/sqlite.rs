//! SQLite summary store

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use chat_compression_core::{CompressionError, ConversationSummary, Result, SummaryStore};

use crate::clock::MonotonicClock;

type SummaryRow = (i64, String, String, i64, String, String);

fn map_sqlx_err(e: sqlx::Error) -> CompressionError {
    CompressionError::Persistence(e.to_string())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    // Fixed width keeps lexical order equal to time order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and the naive `YYYY-MM-DD HH:MM:SS[.ffffff]` form
/// older databases hold, which is read as UTC.
fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| CompressionError::Persistence(format!("unreadable timestamp '{}': {}", raw, e)))
}

fn row_to_summary(
    (id, chat_id, summary, compressed_message_count, created_at, updated_at): SummaryRow,
) -> Result<ConversationSummary> {
    Ok(ConversationSummary {
        id: Some(id),
        chat_id,
        summary,
        compressed_message_count,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

pub struct SqliteSummaryStore {
    pool: SqlitePool,
    clock: MonotonicClock,
}

impl SqliteSummaryStore {
    /// Open (creating if missing) the database named by a `sqlite:` URL and
    /// make sure the `chat_summary` table exists.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(map_sqlx_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(map_sqlx_err)?;
        Self::with_pool(pool).await
    }

    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(map_sqlx_err)?;
        // Every connection to :memory: is its own database, so pin the pool to one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(map_sqlx_err)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
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
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL UNIQUE,
                summary TEXT NOT NULL,
                compressed_message_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
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
impl SummaryStore for SqliteSummaryStore {
    async fn load(&self, chat_id: &str) -> Result<Option<ConversationSummary>> {
        let row: Option<SummaryRow> = sqlx::query_as(
            r#"
            SELECT id, chat_id, summary, compressed_message_count, created_at, updated_at
            FROM chat_summary WHERE chat_id = ?
            "#,
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        row.map(row_to_summary).transpose()
    }

    async fn save(&self, chat_id: &str, summary: &str, message_count: usize) -> Result<()> {
        let now = format_ts(self.clock.now());

        sqlx::query(
            r#"
            INSERT INTO chat_summary (chat_id, summary, compressed_message_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                summary = excluded.summary,
                compressed_message_count = excluded.compressed_message_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(chat_id)
        .bind(summary)
        .bind(message_count as i64)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn delete(&self, chat_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chat_summary WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT id, chat_id, summary, compressed_message_count, created_at, updated_at
            FROM chat_summary
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        // Legacy and RFC 3339 text do not sort together, so order parsed values.
        let mut summaries = rows
            .into_iter()
            .map(row_to_summary)
            .collect::<Result<Vec<_>>>()?;
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}
