//! Recall grade on the SM-2 scale.
//!
//! - 0: Complete blackout
//! - 1: Incorrect, but the answer was recognized
//! - 2: Incorrect, but the answer seemed easy to recall
//! - 3: Correct with serious difficulty
//! - 4: Correct after hesitation
//! - 5: Perfect response
use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Grade(u8);

impl Grade {
    pub const MAX: u8 = 5;
    pub const DEFAULT: Grade = Grade(4);

    /// Validates a raw grade. Anything outside 0..=5 is rejected.
    pub fn new(value: i64) -> Result<Self> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SchedulerError::InvalidGrade(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Grade> {
        (0..=Self::MAX).map(Grade)
    }
}

impl Default for Grade {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for Grade {
    type Error = SchedulerError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Grade> for i64 {
    fn from(grade: Grade) -> Self {
        grade.0 as i64
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
