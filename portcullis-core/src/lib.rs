//! Core functionality for the portcullis rate limiting ecosystem
//!
//! This crate contains the decision logic for gating abusable actions:
//! the attempt log data model, the dual-key (email + IP) rate limit
//! service with exponential per-pair backoff, the repository trait that
//! storage backends implement, and email domain policy validation.
//!
//! The service holds no process-wide state; all counters live behind the
//! [`repositories::AttemptLogRepository`] trait, so it fits stateless
//! per-request handlers sharing one external store.
//!
//! See [`services::RateLimitService`] for the limiter itself and
//! [`attempt::Decision`] for what a check returns.

pub mod attempt;
pub mod config;
pub mod error;
pub mod repositories;
pub mod services;
pub mod validation;

pub use attempt::{AttemptOutcome, AttemptRecord, Decision, DenyReason, NewAttempt};
pub use config::{EmailPolicy, RateLimitConfig};
pub use error::Error;
pub use repositories::AttemptLogRepository;
pub use services::RateLimitService;
