//! SM-2 (SuperMemo 2) spaced repetition algorithm implementation.
//!
//! The SM-2 algorithm calculates review intervals based on recall quality:
//! - Each record has an easiness factor (EF) that adjusts with every grade
//! - Grades below the lapse threshold reset repetitions and the interval to 1
//! - Other grades grow the interval progressively (1 day → 6 days → EF multiplier)
//! - EF has a minimum value of 1.3 and no maximum
//!
//! Nothing here touches a store. The grading engine persists the results and
//! the distribution projector discards them.

use super::{Grade, ReviewRecord};
use crate::config::SchedulerConfig;
use chrono::{Days, NaiveDate};

/// E-Factor never falls below this value.
pub const MIN_EASINESS_FACTOR: f64 = 1.3;

/// E-Factor assigned on first exposure.
pub const INITIAL_EASINESS_FACTOR: f64 = 2.5;

/// Adds a non-negative number of days, saturating at the last representable date.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_days(Days::new(days.max(0) as u64))
        .unwrap_or(NaiveDate::MAX)
}

/// Pairs an interval with its due date, shortening the interval when the
/// date would pass the last representable day, so that
/// `review_date == today + interval` always holds.
fn schedule(today: NaiveDate, interval: i64) -> (i64, NaiveDate) {
    let remaining = (NaiveDate::MAX - today).num_days();
    let interval = interval.min(remaining);
    (interval, add_days(today, interval))
}

/// EF' = max(1.3, EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02)))
pub fn next_easiness_factor(easiness_factor: f64, grade: Grade) -> f64 {
    let distance = (Grade::MAX - grade.value()) as f64;
    let new_ef = easiness_factor + (0.1 - distance * (0.08 + distance * 0.02));
    new_ef.max(MIN_EASINESS_FACTOR)
}

/// Interval in days for the given repetition number.
pub fn next_interval(repetitions: u32, previous_interval: i64, easiness_factor: f64) -> i64 {
    match repetitions {
        0 | 1 => 1,
        2 => 6,
        _ => {
            let interval = (previous_interval as f64 * easiness_factor).round();
            // `as` saturates, so runaway growth stays representable.
            (interval as i64).max(1)
        }
    }
}

/// Builds the record created when a learner sees a card for the first time.
pub fn first_exposure(grade: Grade, today: NaiveDate) -> ReviewRecord {
    ReviewRecord {
        repetitions: 1,
        easiness_factor: INITIAL_EASINESS_FACTOR,
        computed_interval: 1,
        current_real_interval: 0,
        last_reviewed: today,
        introduced_on: today,
        review_date: add_days(today, 1),
        grade: grade.value(),
        reviews: 1,
        lapses: 0,
        crammed: false,
        comment: None,
    }
}

/// Calculates the record that results from grading `record` on `today`.
///
/// The due-date guard is not applied here; callers decide whether an early
/// review is allowed.
pub fn calculate_next_review(
    record: &ReviewRecord,
    grade: Grade,
    today: NaiveDate,
    config: &SchedulerConfig,
) -> ReviewRecord {
    let easiness_factor = next_easiness_factor(record.easiness_factor, grade);

    let (repetitions, interval, lapses) = if config.is_lapse(grade) {
        // Relearn from scratch, but keep the lowered EF
        (1, 1, record.lapses + 1)
    } else {
        let repetitions = record.repetitions + 1;
        let interval = next_interval(repetitions, record.computed_interval, easiness_factor);
        (repetitions, interval, record.lapses)
    };

    let (computed_interval, review_date) = schedule(today, interval);

    ReviewRecord {
        repetitions,
        easiness_factor,
        computed_interval,
        current_real_interval: (today - record.last_reviewed).num_days(),
        last_reviewed: today,
        introduced_on: record.introduced_on,
        review_date,
        grade: grade.value(),
        reviews: record.reviews + 1,
        lapses,
        crammed: record.crammed,
        comment: record.comment.clone(),
    }
}
