//! PostgreSQL implementation of the attempt log repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    Error,
    attempt::{AttemptOutcome, AttemptRecord, NewAttempt},
    error::StorageError,
    repositories::AttemptLogRepository,
};
use sqlx::PgPool;

/// PostgreSQL repository for the append-only attempt log.
pub struct PostgresAttemptLog {
    pool: PgPool,
}

impl PostgresAttemptLog {
    /// Create a new PostgreSQL attempt log repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct PgAttemptRow {
    id: i64,
    email: String,
    ip_address: String,
    success: bool,
    reason: String,
    attempted_at: DateTime<Utc>,
    blocked_until: Option<DateTime<Utc>>,
}

impl From<PgAttemptRow> for AttemptRecord {
    fn from(row: PgAttemptRow) -> Self {
        AttemptRecord {
            id: row.id,
            email: row.email,
            ip_address: row.ip_address,
            outcome: if row.success {
                AttemptOutcome::Success
            } else {
                AttemptOutcome::Failure
            },
            reason: row.reason,
            attempted_at: row.attempted_at,
            blocked_until: row.blocked_until,
        }
    }
}

#[async_trait]
impl AttemptLogRepository for PostgresAttemptLog {
    async fn record_attempt(&self, attempt: &NewAttempt) -> Result<AttemptRecord, Error> {
        let row = sqlx::query_as::<_, PgAttemptRow>(
            r#"
            INSERT INTO otp_attempts (email, ip_address, success, reason, attempted_at, blocked_until)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, ip_address, success, reason, attempted_at, blocked_until
            "#,
        )
        .bind(&attempt.email)
        .bind(&attempt.ip_address)
        .bind(attempt.outcome.is_success())
        .bind(&attempt.reason)
        .bind(attempt.attempted_at)
        .bind(attempt.blocked_until)
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
            "SELECT COUNT(*) FROM otp_attempts WHERE email = $1 AND attempted_at >= $2",
        )
        .bind(email)
        .bind(since)
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
            "SELECT COUNT(*) FROM otp_attempts WHERE ip_address = $1 AND attempted_at >= $2",
        )
        .bind(ip_address)
        .bind(since)
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
            WHERE email = $1 AND ip_address = $2 AND attempted_at >= $3
            "#,
        )
        .bind(email)
        .bind(ip_address)
        .bind(since)
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
        let max: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT MAX(blocked_until) FROM otp_attempts
            WHERE (email = $1 OR ip_address = $2)
            AND blocked_until IS NOT NULL
            AND blocked_until >= $3
            "#,
        )
        .bind(email)
        .bind(ip_address)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to query active block");
            StorageError::Database("Failed to query active block".to_string())
        })?;

        Ok(max)
    }

    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        // Rows carrying a block that extends past the cutoff are kept so
        // cleanup never shortens an active block
        let result = sqlx::query(
            r#"
            DELETE FROM otp_attempts
            WHERE attempted_at < $1
            AND (blocked_until IS NULL OR blocked_until < $1)
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to cleanup old attempts");
            StorageError::Database("Failed to cleanup old attempts".to_string())
        })?;

        Ok(result.rows_affected())
    }
}
