//! Repository traits for the data access layer
//!
//! This module defines the storage interface the rate limit service is
//! written against. Storage backends implement [`AttemptLogRepository`]
//! over whatever store holds the attempt log.

pub mod attempt_log;

pub use attempt_log::AttemptLogRepository;
