//! Abuse rate limiting service with dual-key tracking.
//!
//! This module implements dual-key (email + IP) abuse protection for
//! sensitive actions such as sending or verifying one-time codes: fixed
//! windows per key, time-bound blocks, and per-pair exponential backoff.
//!
//! # Features
//!
//! - Independent per-email and per-IP fixed-window thresholds
//! - Time-bound blocks derived from the append-only attempt log
//! - Escalating per-pair cool-downs after tolerated failures
//! - Full audit trail of attempts, successful and failed
//! - Background cleanup of old records
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis_core::services::RateLimitService;
//! use portcullis_core::config::RateLimitConfig;
//!
//! let service = RateLimitService::new(repository, RateLimitConfig::default());
//!
//! // Gate the action
//! let decision = service.check("user@example.ch", "203.0.113.7").await?;
//! if !decision.is_allowed() {
//!     // Return 429 with decision.retry_after_seconds()
//! }
//!
//! // Report the outcome back
//! service.record_failure("user@example.ch", "203.0.113.7", "verify_failed").await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    Error,
    attempt::{AttemptOutcome, Decision, DenyReason, NewAttempt},
    config::RateLimitConfig,
    repositories::AttemptLogRepository,
};

/// Service deciding whether an abusable action may proceed.
///
/// The service holds no mutable state of its own; every decision is
/// computed from the attempt log behind the injected repository, so any
/// number of concurrent handler instances can share one store. A check
/// followed by a record for the same logical request is not atomic:
/// concurrent requests may transiently admit more than the nominal
/// threshold, which is acceptable for abuse deterrence.
pub struct RateLimitService<R: AttemptLogRepository> {
    repository: Arc<R>,
    config: RateLimitConfig,
}

impl<R: AttemptLogRepository> RateLimitService<R> {
    /// Create a new RateLimitService.
    ///
    /// # Arguments
    ///
    /// * `repository` - The repository implementation holding the attempt log
    /// * `config` - Policy configuration for windows, thresholds and blocks
    pub fn new(repository: Arc<R>, config: RateLimitConfig) -> Self {
        debug_assert!(config.ip_max_attempts >= config.email_max_attempts);
        debug_assert!(config.ip_block >= config.email_block);
        Self { repository, config }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check if rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Decide whether an action for this `(email, ip)` pair may proceed.
    pub async fn check(&self, email: &str, ip_address: &str) -> Result<Decision, Error> {
        self.check_at(email, ip_address, Utc::now()).await
    }

    /// Deterministic variant of [`check`](Self::check) with an explicit `now`.
    ///
    /// Decision order: an active block on either key denies first; then the
    /// per-email window, then the per-IP window. When a window threshold
    /// trips, this call appends the block record itself, so the denial is
    /// durable without any cooperation from the caller.
    pub async fn check_at(
        &self,
        email: &str,
        ip_address: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, Error> {
        if !self.config.enabled {
            return Ok(Decision::Allowed);
        }

        if let Some(blocked_until) = self.repository.active_block(email, ip_address, now).await? {
            tracing::debug!(
                email = %email,
                ip = %ip_address,
                blocked_until = %blocked_until,
                "Denying request under active block"
            );
            return Ok(Decision::Denied {
                reason: DenyReason::Blocked,
                blocked_until,
                retry_after: blocked_until - now,
            });
        }

        let since = now - self.config.attempt_window;

        let email_count = self.repository.count_by_email(email, since).await?;
        if email_count >= self.config.email_max_attempts {
            return self
                .emit_block(
                    email,
                    ip_address,
                    DenyReason::EmailRateLimit,
                    self.config.email_block,
                    now,
                )
                .await;
        }

        let ip_count = self.repository.count_by_ip(ip_address, since).await?;
        if ip_count >= self.config.ip_max_attempts {
            return self
                .emit_block(
                    email,
                    ip_address,
                    DenyReason::IpRateLimit,
                    self.config.ip_block,
                    now,
                )
                .await;
        }

        Ok(Decision::Allowed)
    }

    /// Record a failed attempt, escalating the per-pair cool-down.
    ///
    /// Attempts for the exact `(email, ip)` pair within the backoff window
    /// are counted, this one included. The first `free_failures` failures
    /// set no block; after that the appended record carries
    /// `blocked_until = now + min(2^(n-1), backoff_cap)` minutes.
    pub async fn record_failure(
        &self,
        email: &str,
        ip_address: &str,
        reason: &str,
    ) -> Result<(), Error> {
        self.record_failure_at(email, ip_address, reason, Utc::now())
            .await
    }

    /// Deterministic variant of [`record_failure`](Self::record_failure).
    pub async fn record_failure_at(
        &self,
        email: &str,
        ip_address: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        if !self.config.enabled {
            return Ok(());
        }

        let since = now - self.config.backoff_window;
        let attempt_count = self
            .repository
            .count_by_pair(email, ip_address, since)
            .await?
            + 1;

        let blocked_until = if attempt_count > self.config.free_failures {
            Some(now + self.backoff_for(attempt_count))
        } else {
            None
        };

        self.repository
            .record_attempt(&NewAttempt {
                email: email.to_string(),
                ip_address: ip_address.to_string(),
                outcome: AttemptOutcome::Failure,
                reason: reason.to_string(),
                attempted_at: now,
                blocked_until,
            })
            .await?;

        tracing::debug!(
            email = %email,
            ip = %ip_address,
            attempt = attempt_count,
            reason = %reason,
            blocked = blocked_until.is_some(),
            "Recorded failed attempt"
        );

        Ok(())
    }

    /// Record a successful attempt.
    ///
    /// Appends a success record tagged with `action` and never touches
    /// block state: a prior block that is still active continues to apply,
    /// because blocks are time-bound rather than attempt-count-bound.
    pub async fn record_success(
        &self,
        email: &str,
        ip_address: &str,
        action: &str,
    ) -> Result<(), Error> {
        self.record_success_at(email, ip_address, action, Utc::now())
            .await
    }

    /// Deterministic variant of [`record_success`](Self::record_success).
    pub async fn record_success_at(
        &self,
        email: &str,
        ip_address: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        if !self.config.enabled {
            return Ok(());
        }

        self.repository
            .record_attempt(&NewAttempt {
                email: email.to_string(),
                ip_address: ip_address.to_string(),
                outcome: AttemptOutcome::Success,
                reason: action.to_string(),
                attempted_at: now,
                blocked_until: None,
            })
            .await?;

        tracing::debug!(email = %email, ip = %ip_address, action = %action, "Recorded successful attempt");

        Ok(())
    }

    /// Start the background cleanup task.
    ///
    /// This spawns a task that periodically deletes attempt records older
    /// than the retention period. Records carrying a still-active block are
    /// kept so cleanup never shortens a block.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - A watch receiver that signals when to stop the task
    ///
    /// # Returns
    ///
    /// A `JoinHandle` for the spawned task.
    pub fn start_cleanup_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let retention = self.config.retention_period;

        const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let before = Utc::now() - retention;
                        match repository.cleanup_old_attempts(before).await {
                            Ok(count) if count > 0 => {
                                tracing::info!(
                                    count = count,
                                    "Cleaned up old attempt records"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    "Failed to cleanup attempt records"
                                );
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down rate limiter cleanup task");
                        break;
                    }
                }
            }
        })
    }

    /// Append the block record for a tripped window threshold.
    async fn emit_block(
        &self,
        email: &str,
        ip_address: &str,
        reason: DenyReason,
        horizon: Duration,
        now: DateTime<Utc>,
    ) -> Result<Decision, Error> {
        let blocked_until = now + horizon;

        self.repository
            .record_attempt(&NewAttempt {
                email: email.to_string(),
                ip_address: ip_address.to_string(),
                outcome: AttemptOutcome::Failure,
                reason: reason.as_str().to_string(),
                attempted_at: now,
                blocked_until: Some(blocked_until),
            })
            .await?;

        tracing::info!(
            email = %email,
            ip = %ip_address,
            reason = reason.as_str(),
            blocked_until = %blocked_until,
            "Rate limit threshold tripped"
        );

        Ok(Decision::Denied {
            reason,
            blocked_until,
            retry_after: horizon,
        })
    }

    fn backoff_for(&self, attempt_count: u64) -> Duration {
        let cap = self.config.backoff_cap.num_minutes().max(1) as u64;
        let exponent = u32::try_from(attempt_count.saturating_sub(1)).unwrap_or(u32::MAX);
        let minutes = 2u64.saturating_pow(exponent).min(cap);
        Duration::minutes(minutes as i64)
    }
}
