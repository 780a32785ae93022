//! Repository trait for the attempt log.
//!
//! This module defines the storage interface for recording attempts and
//! answering the window/block queries the rate limiter needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    attempt::{AttemptRecord, NewAttempt},
};

/// Repository for the append-only attempt log.
///
/// The log is insert-only: rows are never mutated after being written, and
/// block state is derived by querying `blocked_until` rather than updating
/// rows in place. No multi-row transactions are required; each method is an
/// independent read or write, which makes the check-then-record pattern
/// approximate under concurrency by design.
///
/// # Security Considerations
///
/// - Attempts should be recorded for all email addresses, even non-existent
///   ones, to prevent user enumeration attacks.
/// - IP addresses stored for auditing may be subject to data retention
///   regulations; `cleanup_old_attempts` bounds how long rows live.
#[async_trait]
pub trait AttemptLogRepository: Send + Sync + 'static {
    /// Append one attempt to the log.
    ///
    /// # Returns
    ///
    /// The created `AttemptRecord` with its assigned ID.
    async fn record_attempt(&self, attempt: &NewAttempt) -> Result<AttemptRecord, Error>;

    /// Count attempts for an email since the given cutoff, across all IPs.
    async fn count_by_email(&self, email: &str, since: DateTime<Utc>) -> Result<u64, Error>;

    /// Count attempts from an IP since the given cutoff, across all emails.
    async fn count_by_ip(&self, ip_address: &str, since: DateTime<Utc>) -> Result<u64, Error>;

    /// Count attempts for an exact `(email, ip)` pair since the given cutoff.
    async fn count_by_pair(
        &self,
        email: &str,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, Error>;

    /// The effective block for the email or the IP at time `at`.
    ///
    /// # Returns
    ///
    /// The maximum `blocked_until` among records matching either key with
    /// `blocked_until >= at`, or `None` when neither key is blocked.
    async fn active_block(
        &self,
        email: &str,
        ip_address: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, Error>;

    /// Delete attempts older than the given timestamp.
    ///
    /// Rows whose `blocked_until` extends past `before` must be kept so
    /// that cleanup never shortens an active block.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
