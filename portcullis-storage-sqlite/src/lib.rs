//! SQLite storage backend for the portcullis rate limiter.
//!
//! Stores the attempt log in a single `otp_attempts` table with
//! integer-seconds timestamps. Suitable for single-node deployments and
//! for in-memory databases in tests.

pub mod migrations;
pub mod repositories;

use portcullis_core::{Error, error::StorageError};
use portcullis_migration::{Migration, MigrationManager};
use sqlx::{Sqlite, SqlitePool};

pub use migrations::SqliteMigrationManager;
pub use repositories::SqliteAttemptLog;

/// Apply all migrations for this backend to the given pool.
pub async fn migrate(pool: &SqlitePool) -> Result<(), Error> {
    let manager = SqliteMigrationManager::new(pool.clone());
    manager
        .initialize()
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    let migrations: Vec<Box<dyn Migration<Sqlite>>> = vec![
        Box::new(migrations::CreateAttemptLogTable),
        Box::new(migrations::CreateAttemptLogIndexes),
    ];
    manager
        .up(&migrations)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    Ok(())
}

/// Connect to a SQLite database and return a migrated attempt log.
pub async fn connect(url: &str) -> Result<SqliteAttemptLog, Error> {
    let pool = SqlitePool::connect(url)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    migrate(&pool).await?;
    Ok(SqliteAttemptLog::new(pool))
}
