use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::{AppConfig, StoreBackend};
use crate::database::memory::MemoryStore;
use crate::database::models::Plan;
use crate::database::postgres::PgStore;
use crate::database::store::Store;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("organization must keep at least one owner")]
    LastOwner,

    #[error("Corrupt stored document: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Translate a unique violation into a user-facing conflict
    pub fn from_unique(err: sqlx::Error, message: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DatabaseError::Conflict(message.into())
            }
            _ => DatabaseError::Sqlx(err),
        }
    }
}

/// Builds the configured store and owns the Postgres pool lifecycle
pub struct DatabaseManager;

impl DatabaseManager {
    /// Connect to Postgres using the configured URL and pool settings
    pub async fn connect(config: &AppConfig) -> Result<PgPool, DatabaseError> {
        let url = config
            .database
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
            .connect(url)
            .await?;

        info!(
            "Connected to Postgres (max_connections={})",
            config.database.max_connections
        );
        Ok(pool)
    }

    /// Apply the embedded migrations
    pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Store selected by `SCENEHUB_STORE`. The memory store starts with the
    /// built-in plan catalog; Postgres plans come from `scenehub plans seed`.
    pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>, DatabaseError> {
        match config.database.backend {
            StoreBackend::Memory => {
                info!("Using in-memory store; data is lost on shutdown");
                Ok(Arc::new(MemoryStore::with_plans(Plan::default_catalog())))
            }
            StoreBackend::Postgres => {
                let pool = Self::connect(config).await?;
                Self::migrate(&pool).await?;
                Ok(Arc::new(PgStore::new(pool)))
            }
        }
    }

    /// Pings the store to ensure connectivity
    pub async fn health_check(store: &dyn Store) -> Result<(), DatabaseError> {
        store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn postgres_backend_requires_url() {
        let mut config = AppConfig::from_env();
        config.database.backend = StoreBackend::Postgres;
        config.database.url = None;
        let err = DatabaseManager::connect(&config).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConfigMissing("DATABASE_URL")));
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_before_connecting() {
        let mut config = AppConfig::from_env();
        config.database.url = Some("not a url".into());
        let err = DatabaseManager::connect(&config).await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidDatabaseUrl));
    }

    #[tokio::test]
    async fn memory_backend_is_seeded() {
        let mut config = AppConfig::from_env();
        config.database.backend = StoreBackend::Memory;
        let store = DatabaseManager::open_store(&config).await.unwrap();
        DatabaseManager::health_check(store.as_ref()).await.unwrap();
        assert!(store.find_plan("free").await.unwrap().is_some());
    }
}
