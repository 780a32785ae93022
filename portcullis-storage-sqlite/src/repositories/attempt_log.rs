//! SQLite implementation of the attempt log repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    Error,
    attempt::{AttemptOutcome, AttemptRecord, NewAttempt},
    error::StorageError,
    repositories::AttemptLogRepository,
};
use sqlx::SqlitePool;

/// SQLite repository for the append-only attempt log.
pub struct SqliteAttemptLog {
    pool: SqlitePool,
}

impl SqliteAttemptLog {
    /// Create a new SQLite attempt log repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteAttemptRow {
    id: i64,
    email: String,
    ip_address: String,
    success: i64,
    reason: String,
    attempted_at: i64,
    blocked_until: Option<i64>,
}

impl From<SqliteAttemptRow> for AttemptRecord {
    fn from(row: SqliteAttemptRow) -> Self {
        AttemptRecord {
            id: row.id,
            email: row.email,
            ip_address: row.ip_address,
            outcome: if row.success != 0 {
                AttemptOutcome::Success
            } else {
                AttemptOutcome::Failure
            },
            reason: row.reason,
            attempted_at: DateTime::from_timestamp(row.attempted_at, 0)
                .expect("Invalid timestamp"),
            blocked_until: row
                .blocked_until
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }
}

#[async_trait]
impl AttemptLogRepository for SqliteAttemptLog {
    async fn record_attempt(&self, attempt: &NewAttempt) -> Result<AttemptRecord, Error> {
        let row = sqlx::query_as::<_, SqliteAttemptRow>(
            r#"
            INSERT INTO otp_attempts (email, ip_address, success, reason, attempted_at, blocked_until)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, email, ip_address, success, reason, attempted_at, blocked_until
            "#,
        )
        .bind(&attempt.email)
        .bind(&attempt.ip_address)
        .bind(attempt.outcome.is_success() as i64)
        .bind(&attempt.reason)
        .bind(attempt.attempted_at.timestamp())
        .bind(attempt.blocked_until.map(|b| b.timestamp()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to record attempt");
            StorageError::Database("Failed to record attempt".to_string())
        })?;

        Ok(row.into())
    }

    async fn count_by_email(&self, email: &str, since: DateTime<Utc>) -> Result<u64, Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM otp_attempts WHERE email = ? AND attempted_at >= ?",
        )
        .bind(email)
        .bind(since.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to count attempts by email");
            StorageError::Database("Failed to count attempts by email".to_string())
        })?;

        Ok(count as u64)
    }

    async fn count_by_ip(&self, ip_address: &str, since: DateTime<Utc>) -> Result<u64, Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM otp_attempts WHERE ip_address = ? AND attempted_at >= ?",
        )
        .bind(ip_address)
        .bind(since.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to count attempts by ip");
            StorageError::Database("Failed to count attempts by ip".to_string())
        })?;

        Ok(count as u64)
    }

    async fn count_by_pair(
        &self,
        email: &str,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM otp_attempts
            WHERE email = ? AND ip_address = ? AND attempted_at >= ?
            "#,
        )
        .bind(email)
        .bind(ip_address)
        .bind(since.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to count attempts by pair");
            StorageError::Database("Failed to count attempts by pair".to_string())
        })?;

        Ok(count as u64)
    }

    async fn active_block(
        &self,
        email: &str,
        ip_address: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, Error> {
        let max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(blocked_until) FROM otp_attempts
            WHERE (email = ? OR ip_address = ?)
            AND blocked_until IS NOT NULL
            AND blocked_until >= ?
            "#,
        )
        .bind(email)
        .bind(ip_address)
        .bind(at.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to query active block");
            StorageError::Database("Failed to query active block".to_string())
        })?;

        Ok(max.and_then(|ts| DateTime::from_timestamp(ts, 0)))
    }

    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        // Rows carrying a block that extends past the cutoff are kept so
        // cleanup never shortens an active block
        let result = sqlx::query(
            r#"
            DELETE FROM otp_attempts
            WHERE attempted_at < ?
            AND (blocked_until IS NULL OR blocked_until < ?)
            "#,
        )
        .bind(before.timestamp())
        .bind(before.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to cleanup old attempts");
            StorageError::Database("Failed to cleanup old attempts".to_string())
        })?;

        Ok(result.rows_affected())
    }
}
