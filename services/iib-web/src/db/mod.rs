//! Database layer: connection pool management plus one store per aggregate
//! (requests, batches, images, idempotency records). SQLx against Postgres,
//! with hand-written `FromRow` impls throughout since the `macros` feature
//! is disabled workspace-wide to avoid a compile-time database connection.

mod batch_store;
mod error;
mod idempotency;
mod image_store;
mod request_store;

pub use batch_store::BatchStore;
pub use error::DbError;
pub use idempotency::{IdempotencyCheck, IdempotencyRecord, IdempotencyStore};
pub use image_store::ImageStore;
pub use request_store::{RequestFilters, RequestPatch, RequestStore};

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/iib".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/iib".to_string());

        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let min_connections = std::env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        Self {
            database_url,
            max_connections,
            min_connections,
            ..Default::default()
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        info!("Database connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }

    /// Runtime-loaded migrations (not the compile-time `sqlx::migrate!`
    /// macro, for the same reason the `macros` sqlx feature is disabled).
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        info!("Running database migrations");

        let migrator = sqlx::migrate::Migrator::new(std::path::Path::new("./migrations"))
            .await
            .map_err(DbError::Migration)?;

        migrator.run(&self.pool).await.map_err(DbError::Migration)?;

        info!("Database migrations complete");
        Ok(())
    }

    pub fn requests(&self) -> RequestStore {
        RequestStore::new(self.pool.clone())
    }

    pub fn batches(&self) -> BatchStore {
        BatchStore::new(self.pool.clone())
    }

    pub fn images(&self) -> ImageStore {
        ImageStore::new(self.pool.clone())
    }

    pub fn idempotency(&self) -> IdempotencyStore {
        IdempotencyStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
    }
}
