//! PostgreSQL storage backend for the portcullis rate limiter.
//!
//! Stores the attempt log in a single `otp_attempts` table using native
//! `TIMESTAMPTZ` columns. This is the backend for multi-node deployments
//! where every handler instance shares one database.

pub mod migrations;
pub mod repositories;

use portcullis_core::{Error, error::StorageError};
use portcullis_migration::{Migration, MigrationManager};
use sqlx::{PgPool, Postgres};

pub use migrations::PostgresMigrationManager;
pub use repositories::PostgresAttemptLog;

/// Apply all migrations for this backend to the given pool.
pub async fn migrate(pool: &PgPool) -> Result<(), Error> {
    let manager = PostgresMigrationManager::new(pool.clone());
    manager
        .initialize()
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    let migrations: Vec<Box<dyn Migration<Postgres>>> = vec![
        Box::new(migrations::CreateAttemptLogTable),
        Box::new(migrations::CreateAttemptLogIndexes),
    ];
    manager
        .up(&migrations)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    Ok(())
}

/// Connect to a PostgreSQL database and return a migrated attempt log.
pub async fn connect(url: &str) -> Result<PostgresAttemptLog, Error> {
    let pool = PgPool::connect(url)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    migrate(&pool).await?;
    Ok(PostgresAttemptLog::new(pool))
}
