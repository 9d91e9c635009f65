//! Scheduler settings, loadable from a TOML file.
//!
//! ```toml
//! database_path = "db.sqlite3"
//! default_grade = 4
//! lapse_threshold = 3
//! default_days_range = 3
//! max_days_range = 30
//! ```
//!
//! Missing keys fall back to the defaults below.

use crate::error::ConfigError;
use crate::models::Grade;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Grades strictly below this value count as a lapse.
pub const LAPSE_THRESHOLD: u8 = 3;

/// Horizon used by the distribution projector when none is given.
pub const DEFAULT_DAYS_RANGE: i64 = 3;

/// Largest horizon the distribution projector accepts.
pub const MAX_DAYS_RANGE: i64 = 30;

/// Hard bound on any configured `max_days_range`.
pub const MAX_DAYS_RANGE_LIMIT: i64 = 3650;

pub const DEFAULT_DATABASE_PATH: &str = "db.sqlite3";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub database_path: String,
    pub default_grade: Grade,
    pub lapse_threshold: u8,
    pub default_days_range: i64,
    pub max_days_range: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            default_grade: Grade::DEFAULT,
            lapse_threshold: LAPSE_THRESHOLD,
            default_days_range: DEFAULT_DAYS_RANGE,
            max_days_range: MAX_DAYS_RANGE,
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        log::debug!("loaded config from {}", path.as_ref().display());
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // A threshold of 6 turns every grade into a lapse, 0 disables lapses.
        if self.lapse_threshold > Grade::MAX + 1 {
            return Err(ConfigError::Invalid(format!(
                "lapse_threshold must be within 0..=6, got {}",
                self.lapse_threshold
            )));
        }
        if !(0..=MAX_DAYS_RANGE_LIMIT).contains(&self.max_days_range) {
            return Err(ConfigError::Invalid(format!(
                "max_days_range must be within 0..={}, got {}",
                MAX_DAYS_RANGE_LIMIT, self.max_days_range
            )));
        }
        if !(0..=self.max_days_range).contains(&self.default_days_range) {
            return Err(ConfigError::Invalid(format!(
                "default_days_range must be within 0..={}, got {}",
                self.max_days_range, self.default_days_range
            )));
        }
        Ok(())
    }

    /// Largest horizon the projector accepts, never above [`MAX_DAYS_RANGE_LIMIT`].
    pub fn days_range_ceiling(&self) -> i64 {
        self.max_days_range.clamp(0, MAX_DAYS_RANGE_LIMIT)
    }

    pub fn is_lapse(&self, grade: Grade) -> bool {
        grade.value() < self.lapse_threshold
    }
}
