//! SQLite repository implementations.

pub mod attempt_log;

pub use attempt_log::SqliteAttemptLog;
