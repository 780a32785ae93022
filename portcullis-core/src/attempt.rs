//! Attempt log data model.
//!
//! Every check-and-record cycle appends exactly one [`AttemptRecord`] to the
//! store. Records are immutable once written; block state is derived from
//! them rather than kept as a separate mutable row.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a recorded attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// One row in the append-only attempt log.
///
/// `blocked_until`, when set, must be strictly later than `attempted_at`.
/// The effective block for an identity key at time T is the maximum
/// `blocked_until` among its records where `blocked_until > T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: i64,
    pub email: String,
    pub ip_address: String,
    pub outcome: AttemptOutcome,
    /// Free-form classification tag, e.g. `invalid_email`, `send_failed`,
    /// `verify_failed`, `email_rate_limit`.
    pub reason: String,
    pub attempted_at: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// An attempt that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub email: String,
    pub ip_address: String,
    pub outcome: AttemptOutcome,
    pub reason: String,
    pub attempted_at: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Why a check was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// An earlier block is still active.
    Blocked,
    /// The per-email fixed-window threshold tripped.
    EmailRateLimit,
    /// The per-IP fixed-window threshold tripped.
    IpRateLimit,
}

impl DenyReason {
    /// The tag written into the attempt log when this denial emits a block.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Blocked => "blocked",
            DenyReason::EmailRateLimit => "email_rate_limit",
            DenyReason::IpRateLimit => "ip_rate_limit",
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed,
    Denied {
        reason: DenyReason,
        blocked_until: DateTime<Utc>,
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// Seconds until the caller may retry, `None` when allowed.
    ///
    /// Rounded up so a caller sleeping this long always lands past the block.
    pub fn retry_after_seconds(&self) -> Option<i64> {
        match self {
            Decision::Allowed => None,
            Decision::Denied { retry_after, .. } => {
                let millis = retry_after.num_milliseconds().max(0);
                Some((millis + 999) / 1000)
            }
        }
    }

    /// Human-readable denial message including the retry time in minutes.
    pub fn message(&self) -> Option<String> {
        let seconds = self.retry_after_seconds()?;
        let minutes = ((seconds + 59) / 60).max(1);
        let msg = match self {
            Decision::Allowed => return None,
            Decision::Denied {
                reason: DenyReason::EmailRateLimit,
                ..
            } => format!(
                "Too many attempts for this email address. Please try again in {minutes} minutes."
            ),
            Decision::Denied {
                reason: DenyReason::IpRateLimit,
                ..
            } => format!(
                "Too many attempts from this location. Please try again in {minutes} minutes."
            ),
            Decision::Denied { .. } => {
                format!("Too many attempts. Please try again in {minutes} minutes.")
            }
        };
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_seconds_rounds_up() {
        let decision = Decision::Denied {
            reason: DenyReason::Blocked,
            blocked_until: Utc::now(),
            retry_after: Duration::milliseconds(1500),
        };
        assert_eq!(decision.retry_after_seconds(), Some(2));
    }

    #[test]
    fn test_allowed_has_no_retry_metadata() {
        assert_eq!(Decision::Allowed.retry_after_seconds(), None);
        assert_eq!(Decision::Allowed.message(), None);
    }

    #[test]
    fn test_denial_messages_name_the_dimension() {
        let email_denied = Decision::Denied {
            reason: DenyReason::EmailRateLimit,
            blocked_until: Utc::now(),
            retry_after: Duration::seconds(600),
        };
        assert_eq!(
            email_denied.message().unwrap(),
            "Too many attempts for this email address. Please try again in 10 minutes."
        );

        let ip_denied = Decision::Denied {
            reason: DenyReason::IpRateLimit,
            blocked_until: Utc::now(),
            retry_after: Duration::seconds(900),
        };
        assert_eq!(
            ip_denied.message().unwrap(),
            "Too many attempts from this location. Please try again in 15 minutes."
        );
    }

    #[test]
    fn test_deny_reason_tags() {
        assert_eq!(DenyReason::EmailRateLimit.as_str(), "email_rate_limit");
        assert_eq!(DenyReason::IpRateLimit.as_str(), "ip_rate_limit");
        assert_eq!(DenyReason::Blocked.as_str(), "blocked");
    }
}
