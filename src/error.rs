//! Error types for the scheduler, its stores and its configuration.

use crate::models::RecordKey;
use chrono::NaiveDate;
use thiserror::Error;

/// Errors returned by scheduling operations.
///
/// Every variant is recoverable by the caller. Operations are deterministic,
/// so retrying with the same input reproduces the same error.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("grade {0} is outside the 0-5 scale")]
    InvalidGrade(i64),

    #[error("card {} is already memorized by learner {}", .0.card, .0.learner)]
    AlreadyMemorized(RecordKey),

    #[error("card {} is not memorized by learner {}", .0.card, .0.learner)]
    NotMemorized(RecordKey),

    #[error("card is not due for review before {due}")]
    ReviewBeforeDue { due: NaiveDate },

    #[error("days range must be a non-negative number, got {0}")]
    InvalidRange(i64),

    #[error("days range exceeds the allowed maximum of {ceiling} days")]
    RangeExceeded { ceiling: i64 },

    #[error("malformed legacy record: {0}")]
    MalformedLegacyRecord(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised by [`crate::store::ReviewStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("invalid stored date: {0}")]
    InvalidDate(String),
}

/// Errors raised while loading a [`crate::config::SchedulerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
