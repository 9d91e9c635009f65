//! Forecast of how many cards fall due on each of the coming days.
//!
//! Every record due within the horizon is graded forward with a fixed assumed
//! grade, using the same formulas as a real review. Results are discarded.

use super::sm2::{add_days, calculate_next_review};
use super::{Grade, ReviewRecord};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub offset: i64,
    pub date: NaiveDate,
    pub count: usize,
}

/// Due-card counts for day offsets `0..=days_range`, starting today.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Distribution {
    pub start: NaiveDate,
    counts: Vec<usize>,
}

impl Distribution {
    fn empty(start: NaiveDate, days_range: i64) -> Self {
        Self {
            start,
            counts: vec![0; days_range as usize + 1],
        }
    }

    pub fn days_range(&self) -> i64 {
        self.counts.len() as i64 - 1
    }

    pub fn count_on(&self, offset: i64) -> usize {
        usize::try_from(offset)
            .ok()
            .and_then(|index| self.counts.get(index).copied())
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = DayCount> + '_ {
        self.counts.iter().enumerate().map(|(index, &count)| DayCount {
            offset: index as i64,
            date: add_days(self.start, index as i64),
            count,
        })
    }

    pub fn to_day_counts(&self) -> Vec<DayCount> {
        self.iter().collect()
    }
}

/// Rejects horizons that are negative or above the configured ceiling.
pub fn validate_days_range(days_range: i64, config: &SchedulerConfig) -> Result<()> {
    if days_range < 0 {
        return Err(SchedulerError::InvalidRange(days_range));
    }
    let ceiling = config.days_range_ceiling();
    if days_range > ceiling {
        return Err(SchedulerError::RangeExceeded { ceiling });
    }
    Ok(())
}

/// Grade assumed when simulating a record forward: its most recent grade.
fn assumed_grade(record: &ReviewRecord, config: &SchedulerConfig) -> Grade {
    Grade::new(record.grade as i64).unwrap_or(config.default_grade)
}

/// Projects per-day due counts over `today..=today + days_range`.
///
/// Overdue records count as due today.
pub fn project_distribution(
    records: &[ReviewRecord],
    today: NaiveDate,
    days_range: i64,
    config: &SchedulerConfig,
) -> Result<Distribution> {
    validate_days_range(days_range, config)?;

    let mut distribution = Distribution::empty(today, days_range);
    let horizon_end = add_days(today, days_range);

    for record in records.iter().filter(|record| record.review_date <= horizon_end) {
        let grade = assumed_grade(record, config);
        let mut state = record.clone();
        let mut due = state.review_date.max(today);

        // Each simulated review moves the due date at least one day ahead,
        // so the horizon bounds the number of steps.
        for _ in 0..=days_range {
            if due > horizon_end {
                break;
            }
            let offset = (due - today).num_days() as usize;
            distribution.counts[offset] += 1;

            state = calculate_next_review(&state, grade, due, config);
            due = state.review_date;
        }
    }

    Ok(distribution)
}

/// Outcome of grading a record today with a particular grade.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectedReview {
    pub grade: Grade,
    pub record: ReviewRecord,
}

/// Previews the record each grade would produce if reviewed on `today`.
pub fn simulate_reviews(
    record: &ReviewRecord,
    today: NaiveDate,
    config: &SchedulerConfig,
) -> Vec<ProjectedReview> {
    Grade::all()
        .map(|grade| ProjectedReview {
            grade,
            record: calculate_next_review(record, grade, today, config),
        })
        .collect()
}
