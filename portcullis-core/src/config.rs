//! Policy configuration for the rate limiter.

use chrono::Duration;

/// Tuning knobs for the dual-key rate limiter.
///
/// The defaults mirror the production policy: 5 attempts per email and 10
/// per IP within a 5 minute window, 10/15 minute blocks when a window
/// threshold trips, and per-pair exponential backoff after 3 tolerated
/// failures, capped at 30 minutes.
///
/// Implementations may tune these, but the relative ordering must hold:
/// `ip_max_attempts >= email_max_attempts` and `ip_block >= email_block`.
/// IP-level false positives affect more legitimate users, so that
/// dimension trips more rarely but blocks for longer.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether rate limiting is active. When disabled, every check is
    /// allowed and nothing is recorded.
    pub enabled: bool,
    /// Sliding window inspected by `check`.
    pub attempt_window: Duration,
    /// Maximum attempts per email within `attempt_window`.
    pub email_max_attempts: u64,
    /// Maximum attempts per IP within `attempt_window`, across all emails.
    pub ip_max_attempts: u64,
    /// Block horizon applied when the email threshold trips.
    pub email_block: Duration,
    /// Block horizon applied when the IP threshold trips.
    pub ip_block: Duration,
    /// Lookback window for the per-pair exponential backoff.
    pub backoff_window: Duration,
    /// Failures tolerated per pair before backoff blocks start.
    pub free_failures: u64,
    /// Ceiling for a single backoff block.
    pub backoff_cap: Duration,
    /// Records older than this are eligible for background cleanup.
    pub retention_period: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempt_window: Duration::minutes(5),
            email_max_attempts: 5,
            ip_max_attempts: 10,
            email_block: Duration::minutes(10),
            ip_block: Duration::minutes(15),
            backoff_window: Duration::minutes(60),
            free_failures: 3,
            backoff_cap: Duration::minutes(30),
            retention_period: Duration::days(7),
        }
    }
}

impl RateLimitConfig {
    /// A configuration with protection turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Email domain allow/block policy.
///
/// A domain ending in one of `allowed_suffixes` is always accepted and
/// bypasses the blocklist; a domain in `blocked_domains` is rejected;
/// anything else is accepted.
#[derive(Debug, Clone)]
pub struct EmailPolicy {
    pub allowed_suffixes: Vec<String>,
    pub blocked_domains: Vec<String>,
}

impl Default for EmailPolicy {
    fn default() -> Self {
        Self {
            allowed_suffixes: vec![".ch".to_string()],
            blocked_domains: vec![
                "example.com".to_string(),
                "test.com".to_string(),
                "invalid.com".to_string(),
                "fake.com".to_string(),
            ],
        }
    }
}
