//! Summary store backends for the chat context-compression engine

mod clock;
mod disabled;
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

use std::sync::Arc;

use tracing::{info, warn};

pub use chat_compression_core::{
    CompressionError, ConversationSummary, Result, StoreStats, SummaryStore,
};
pub use disabled::DisabledStore;
pub use memory::InMemorySummaryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSummaryStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresSummaryStore;

/// Environment variable holding the store connection string.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Backend family selected by the connection string's scheme prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite { url: String },
    Postgres { url: String },
}

impl StoreBackend {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CompressionError::Config(format!(
                "{} is empty",
                DATABASE_URL_ENV
            )));
        }

        if url.starts_with("sqlite") {
            return Ok(StoreBackend::Sqlite {
                url: url.to_string(),
            });
        }

        if let Some(rest) = url.strip_prefix("postgres://") {
            return Ok(StoreBackend::Postgres {
                url: format!("postgresql://{}", rest),
            });
        }

        if url.starts_with("postgres") {
            return Ok(StoreBackend::Postgres {
                url: url.to_string(),
            });
        }

        Err(CompressionError::Config(format!(
            "unsupported database type in {}: expected a 'sqlite' or 'postgres' URL",
            DATABASE_URL_ENV
        )))
    }

    pub fn from_env() -> Result<Self> {
        let url = std::env::var(DATABASE_URL_ENV)
            .map_err(|_| CompressionError::Config(format!("{} is not set", DATABASE_URL_ENV)))?;
        Self::parse(&url)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite { .. } => "sqlite",
            StoreBackend::Postgres { .. } => "postgres",
        }
    }
}

/// Open the backend, creating the `chat_summary` table if needed.
pub async fn try_create_store(backend: &StoreBackend) -> Result<Arc<dyn SummaryStore>> {
    match backend {
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite { url } => Ok(Arc::new(SqliteSummaryStore::new(url).await?)),

        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite { .. } => Err(CompressionError::Config(
            "SQLite store requires 'sqlite' feature".into(),
        )),

        #[cfg(feature = "postgres")]
        StoreBackend::Postgres { url } => Ok(Arc::new(PostgresSummaryStore::new(url).await?)),

        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres { .. } => Err(CompressionError::Config(
            "PostgreSQL store requires 'postgres' feature".into(),
        )),
    }
}

/// Like [`try_create_store`], but never fails: a missing or unusable
/// connection string yields a [`DisabledStore`] and a single warning.
pub async fn create_store(url: Option<&str>) -> Arc<dyn SummaryStore> {
    let opened = match url {
        Some(url) => match StoreBackend::parse(url) {
            Ok(backend) => try_create_store(&backend)
                .await
                .map(|store| (backend.name(), store)),
            Err(e) => Err(e),
        },
        None => Err(CompressionError::Config(format!(
            "{} is not set",
            DATABASE_URL_ENV
        ))),
    };

    match opened {
        Ok((backend, store)) => {
            info!(backend, "Summary store initialised");
            store
        }
        Err(e) => {
            warn!(error = %e, "Summary persistence disabled, conversations will not be compressed");
            Arc::new(DisabledStore::new(e.to_string()))
        }
    }
}

/// [`create_store`] using `DATABASE_URL`.
pub async fn create_store_from_env() -> Arc<dyn SummaryStore> {
    let url = std::env::var(DATABASE_URL_ENV).ok();
    create_store(url.as_deref()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sqlite() {
        let backend = StoreBackend::parse("sqlite:///data/webui.db").unwrap();
        assert_eq!(backend.name(), "sqlite");
        assert_eq!(
            backend,
            StoreBackend::Sqlite {
                url: "sqlite:///data/webui.db".to_string()
            }
        );
    }

    #[test]
    fn test_parse_postgres_normalises_scheme() {
        let backend = StoreBackend::parse("postgres://u:p@db:5432/webui").unwrap();
        assert_eq!(
            backend,
            StoreBackend::Postgres {
                url: "postgresql://u:p@db:5432/webui".to_string()
            }
        );

        let backend = StoreBackend::parse("postgresql://u:p@db/webui").unwrap();
        assert_eq!(backend.name(), "postgres");
    }

    #[test]
    fn test_parse_unsupported() {
        let err = StoreBackend::parse("mysql://root@localhost/db").unwrap_err();
        assert!(matches!(err, CompressionError::Config(_)));
        assert!(StoreBackend::parse("   ").is_err());
    }

    #[tokio::test]
    async fn test_create_store_degrades_to_disabled() {
        let store = create_store(None).await;
        assert!(!store.is_enabled());
        assert_eq!(store.backend_name(), "disabled");

        let store = create_store(Some("redis://localhost")).await;
        assert!(!store.is_enabled());
        store.save("chat-1", "dropped", 20).await.unwrap();
        assert!(store.load("chat-1").await.unwrap().is_none());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_create_store_sqlite_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("summaries.db").display());

        let store = create_store(Some(&url)).await;
        assert!(store.is_enabled());
        assert_eq!(store.backend_name(), "sqlite");

        store.save("chat-1", "kept", 20).await.unwrap();
        assert_eq!(
            store.load("chat-1").await.unwrap().unwrap().summary,
            "kept"
        );
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_create_store_bad_sqlite_path() {
        let store = create_store(Some("sqlite:///nonexistent-dir/for/sure/x.db")).await;
        assert!(!store.is_enabled());
    }
}
