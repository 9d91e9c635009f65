//! Conversion of review state exported by a legacy scheduler.
//!
//! A legacy `<item>` carries its state as raw attributes:
//!
//! | attribute | meaning                                              |
//! |-----------|------------------------------------------------------|
//! | `id`      | item id, in fact its creation time (Unix seconds)    |
//! | `stmtrpt` | days from the scheduler's start to the next repeat   |
//! | `rllivl`  | real last interval in days (0-2048)                  |
//! | `ivl`     | current interval in days (0-2048)                    |
//! | `rp`      | number of not-ahead-of-schedule repeats (0-128)      |
//! | `gr`      | grade (0-5)                                          |
//!
//! The scheduler's start (Unix seconds) is stored once per export.
//! The legacy format has no easiness factor and no lapse count. The factor is
//! reconstructed from the interval ratio, lapses always start at zero.

use super::ReviewRecord;
use crate::error::{Result, SchedulerError};
use chrono::{DateTime, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_LEGACY_INTERVAL: i64 = 2048;
pub const MAX_LEGACY_REPEATS: i64 = 128;
pub const MAX_LEGACY_GRADE: i64 = 5;

pub const LEGACY_MIN_EASINESS_FACTOR: f64 = 1.4;
pub const LEGACY_MAX_EASINESS_FACTOR: f64 = 4.0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRecord {
    #[serde(rename = "id")]
    pub item_id: i64,
    #[serde(rename = "stmtrpt")]
    pub scheduled_repeat_days: i64,
    #[serde(rename = "rllivl")]
    pub real_last_interval_days: i64,
    #[serde(rename = "ivl")]
    pub current_interval_days: i64,
    #[serde(rename = "rp")]
    pub repeat_count: i64,
    #[serde(rename = "gr")]
    pub grade: i64,
}

impl LegacyRecord {
    /// Builds a record from the raw attribute map of an `<item>` element.
    /// Attributes other than the six documented ones are ignored.
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Result<Self> {
        let read = |name: &str| -> Result<i64> {
            let raw = attributes.get(name).ok_or_else(|| {
                SchedulerError::MalformedLegacyRecord(format!("missing attribute '{}'", name))
            })?;
            raw.trim().parse::<i64>().map_err(|_| {
                SchedulerError::MalformedLegacyRecord(format!(
                    "attribute '{}' is not a number: '{}'",
                    name, raw
                ))
            })
        };

        Ok(Self {
            item_id: read("id")?,
            scheduled_repeat_days: read("stmtrpt")?,
            real_last_interval_days: read("rllivl")?,
            current_interval_days: read("ivl")?,
            repeat_count: read("rp")?,
            grade: read("gr")?,
        })
    }

    fn validate(&self) -> Result<()> {
        check_range("rllivl", self.real_last_interval_days, 0, MAX_LEGACY_INTERVAL)?;
        check_range("ivl", self.current_interval_days, 0, MAX_LEGACY_INTERVAL)?;
        check_range("rp", self.repeat_count, 0, MAX_LEGACY_REPEATS)?;
        check_range("gr", self.grade, 0, MAX_LEGACY_GRADE)?;
        if self.scheduled_repeat_days < 0 {
            return Err(SchedulerError::MalformedLegacyRecord(format!(
                "stmtrpt must be non-negative, got {}",
                self.scheduled_repeat_days
            )));
        }
        Ok(())
    }
}

fn check_range(name: &str, value: i64, min: i64, max: i64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SchedulerError::MalformedLegacyRecord(format!(
            "'{}' must be within {}..={}, got {}",
            name, min, max, value
        )))
    }
}

fn date_from_timestamp(name: &str, seconds: i64) -> Result<NaiveDate> {
    if seconds < 0 {
        return Err(SchedulerError::MalformedLegacyRecord(format!(
            "'{}' must be a non-negative Unix time, got {}",
            name, seconds
        )));
    }
    DateTime::from_timestamp(seconds, 0)
        .map(|datetime| datetime.date_naive())
        .ok_or_else(|| {
            SchedulerError::MalformedLegacyRecord(format!(
                "'{}' is not a valid Unix time: {}",
                name, seconds
            ))
        })
}

/// Easiness factor reconstructed from the legacy interval ratio:
/// `ivl / rllivl`, rounded to two decimal places and clamped to 1.4..=4.0.
///
/// Independent of [`super::sm2::next_easiness_factor`]; the two serve
/// different data and have different bounds.
pub fn legacy_easiness_factor(
    current_interval_days: i64,
    real_last_interval_days: i64,
) -> Result<f64> {
    if real_last_interval_days == 0 {
        return Err(SchedulerError::MalformedLegacyRecord(
            "real last interval is zero, easiness factor is undefined".to_string(),
        ));
    }
    let ratio = current_interval_days as f64 / real_last_interval_days as f64;
    let rounded = (ratio * 100.0).round() / 100.0;
    Ok(rounded.clamp(LEGACY_MIN_EASINESS_FACTOR, LEGACY_MAX_EASINESS_FACTOR))
}

/// Converts a legacy record into this scheduler's review state.
///
/// `start` is the legacy scheduler's start time in Unix seconds.
pub fn convert_legacy_record(record: &LegacyRecord, start: i64) -> Result<ReviewRecord> {
    record.validate()?;
    let easiness_factor =
        legacy_easiness_factor(record.current_interval_days, record.real_last_interval_days)?;

    let introduced_on = date_from_timestamp("id", record.item_id)?;
    let start_date = date_from_timestamp("start", start)?;
    let review_date = start_date
        .checked_add_days(Days::new(record.scheduled_repeat_days as u64))
        .ok_or_else(|| {
            SchedulerError::MalformedLegacyRecord(format!(
                "'stmtrpt' {} is beyond the representable date range",
                record.scheduled_repeat_days
            ))
        })?;
    let last_reviewed = review_date
        .checked_sub_days(Days::new(record.current_interval_days as u64))
        .ok_or_else(|| {
            SchedulerError::MalformedLegacyRecord("last review date is out of range".to_string())
        })?;
    if introduced_on > last_reviewed {
        return Err(SchedulerError::MalformedLegacyRecord(format!(
            "introduced on {} after its last review on {}",
            introduced_on, last_reviewed
        )));
    }

    Ok(ReviewRecord {
        repetitions: record.repeat_count.max(1) as u32,
        easiness_factor,
        computed_interval: record.current_interval_days,
        current_real_interval: record.real_last_interval_days,
        last_reviewed,
        introduced_on,
        review_date,
        grade: record.grade as u8,
        reviews: record.repeat_count as u32,
        lapses: 0,
        crammed: false,
        comment: None,
    })
}
