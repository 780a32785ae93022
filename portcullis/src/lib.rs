//! # Portcullis
//!
//! Portcullis is a dual-key abuse rate limiter for sensitive, abusable
//! actions such as sending or verifying one-time codes. It answers one
//! question per request — allow or deny, and if denied, for how long —
//! while keeping every counter in an external attempt log that any number
//! of stateless handler instances can share.
//!
//! The protection is layered:
//! - Fixed windows per email and per IP: hammering one account trips the
//!   email limit, cycling many emails from one address trips the IP limit.
//! - Time-bound blocks appended to the log when a window threshold trips.
//! - Per-`(email, ip)` exponential backoff: a pair that keeps failing
//!   accumulates escalating cool-downs even below the window thresholds.
//!
//! Checks and records are deliberately not atomic; concurrent requests may
//! transiently exceed a threshold. This is deterrence, not airtight
//! enforcement.
//!
//! ## Storage Support
//!
//! Portcullis currently supports the following storage backends:
//! - SQLite
//! - Postgres
//!
//! ## Example
//!
//! ```rust,no_run
//! use portcullis::Portcullis;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = portcullis_storage_sqlite::connect("sqlite::memory:")
//!         .await
//!         .unwrap();
//!     let portcullis = Portcullis::new(Arc::new(log));
//!
//!     let decision = portcullis.check("user@example.ch", "203.0.113.7").await.unwrap();
//!     if decision.is_allowed() {
//!         // run the protected action, then report the outcome back
//!         portcullis
//!             .record_success("user@example.ch", "203.0.113.7", "otp_sent")
//!             .await
//!             .unwrap();
//!     }
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use portcullis_core::{
    repositories::AttemptLogRepository, services::RateLimitService, validation,
};

/// Re-export core types from portcullis_core
///
/// These types are commonly used when working with the Portcullis API.
pub use portcullis_core::{
    AttemptOutcome, AttemptRecord, Decision, DenyReason, EmailPolicy, Error, NewAttempt,
    RateLimitConfig,
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use portcullis_storage_sqlite::SqliteAttemptLog;

#[cfg(feature = "postgres")]
pub use portcullis_storage_postgres::PostgresAttemptLog;

/// The main entry point: a rate limiter plus an email domain policy.
///
/// Wraps [`RateLimitService`] with the domain allow/block policy so a
/// caller can gate, validate and record through one handle.
pub struct Portcullis<R: AttemptLogRepository> {
    limiter: RateLimitService<R>,
    email_policy: EmailPolicy,
}

impl<R: AttemptLogRepository> Portcullis<R> {
    /// Create a limiter with default policy over the given attempt log.
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            limiter: RateLimitService::new(repository, RateLimitConfig::default()),
            email_policy: EmailPolicy::default(),
        }
    }

    /// Replace the rate limit configuration.
    pub fn with_config(repository: Arc<R>, config: RateLimitConfig) -> Self {
        Self {
            limiter: RateLimitService::new(repository, config),
            email_policy: EmailPolicy::default(),
        }
    }

    /// Replace the email domain policy.
    pub fn with_email_policy(mut self, policy: EmailPolicy) -> Self {
        self.email_policy = policy;
        self
    }

    /// The underlying rate limit service.
    pub fn limiter(&self) -> &RateLimitService<R> {
        &self.limiter
    }

    /// The active email domain policy.
    pub fn email_policy(&self) -> &EmailPolicy {
        &self.email_policy
    }

    /// Decide whether an action for this `(email, ip)` pair may proceed.
    pub async fn check(&self, email: &str, ip_address: &str) -> Result<Decision, Error> {
        self.limiter.check(email, ip_address).await
    }

    /// Deterministic variant of [`check`](Self::check) with an explicit `now`.
    pub async fn check_at(
        &self,
        email: &str,
        ip_address: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, Error> {
        self.limiter.check_at(email, ip_address, now).await
    }

    /// Record a failed attempt, escalating the per-pair cool-down.
    pub async fn record_failure(
        &self,
        email: &str,
        ip_address: &str,
        reason: &str,
    ) -> Result<(), Error> {
        self.limiter.record_failure(email, ip_address, reason).await
    }

    /// Deterministic variant of [`record_failure`](Self::record_failure).
    pub async fn record_failure_at(
        &self,
        email: &str,
        ip_address: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.limiter
            .record_failure_at(email, ip_address, reason, now)
            .await
    }

    /// Record a successful attempt. Never clears an existing block.
    pub async fn record_success(
        &self,
        email: &str,
        ip_address: &str,
        action: &str,
    ) -> Result<(), Error> {
        self.limiter.record_success(email, ip_address, action).await
    }

    /// Deterministic variant of [`record_success`](Self::record_success).
    pub async fn record_success_at(
        &self,
        email: &str,
        ip_address: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.limiter
            .record_success_at(email, ip_address, action, now)
            .await
    }

    /// Validate an email address against the configured domain policy.
    pub fn validate_email(&self, email: &str) -> Result<(), Error> {
        validation::validate_email_domain(email, &self.email_policy)?;
        Ok(())
    }

    /// Start the hourly background cleanup of old attempt records.
    pub fn start_cleanup_task(
        &self,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        self.limiter.start_cleanup_task(shutdown)
    }
}
