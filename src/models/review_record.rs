//! Per-learner review state of a single card.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LearnerId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardId(pub i64);

impl fmt::Display for LearnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the single review record a learner holds for a card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub learner: LearnerId,
    pub card: CardId,
}

impl RecordKey {
    pub fn new(learner: LearnerId, card: CardId) -> Self {
        Self { learner, card }
    }
}

/// SM-2 review state. One record exists per (learner, card) pair.
///
/// `review_date` is always `last_reviewed + computed_interval` for records
/// produced by the grading engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub repetitions: u32,
    pub easiness_factor: f64,
    pub computed_interval: i64,
    pub current_real_interval: i64,
    pub last_reviewed: NaiveDate,
    pub introduced_on: NaiveDate,
    pub review_date: NaiveDate,
    pub grade: u8,
    pub reviews: u32,
    pub lapses: u32,
    pub crammed: bool,
    pub comment: Option<String>,
}

impl ReviewRecord {
    /// Whether the card is scheduled on or before `today`.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.review_date <= today
    }

    /// Reads a single field by tag.
    pub fn field(&self, field: ReviewField) -> FieldValue {
        match field {
            ReviewField::Repetitions => FieldValue::Count(self.repetitions),
            ReviewField::EasinessFactor => FieldValue::Factor(self.easiness_factor),
            ReviewField::ComputedInterval => FieldValue::Days(self.computed_interval),
            ReviewField::CurrentRealInterval => FieldValue::Days(self.current_real_interval),
            ReviewField::LastReviewed => FieldValue::Date(self.last_reviewed),
            ReviewField::IntroducedOn => FieldValue::Date(self.introduced_on),
            ReviewField::ReviewDate => FieldValue::Date(self.review_date),
            ReviewField::Grade => FieldValue::Grade(self.grade),
            ReviewField::Reviews => FieldValue::Count(self.reviews),
            ReviewField::Lapses => FieldValue::Count(self.lapses),
            ReviewField::Crammed => FieldValue::Flag(self.crammed),
            ReviewField::Comment => FieldValue::Text(self.comment.clone()),
        }
    }
}

/// Names a single [`ReviewRecord`] field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewField {
    Repetitions,
    EasinessFactor,
    ComputedInterval,
    CurrentRealInterval,
    LastReviewed,
    IntroducedOn,
    ReviewDate,
    Grade,
    Reviews,
    Lapses,
    Crammed,
    Comment,
}

impl ReviewField {
    pub const ALL: [ReviewField; 12] = [
        ReviewField::Repetitions,
        ReviewField::EasinessFactor,
        ReviewField::ComputedInterval,
        ReviewField::CurrentRealInterval,
        ReviewField::LastReviewed,
        ReviewField::IntroducedOn,
        ReviewField::ReviewDate,
        ReviewField::Grade,
        ReviewField::Reviews,
        ReviewField::Lapses,
        ReviewField::Crammed,
        ReviewField::Comment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReviewField::Repetitions => "repetitions",
            ReviewField::EasinessFactor => "easiness_factor",
            ReviewField::ComputedInterval => "computed_interval",
            ReviewField::CurrentRealInterval => "current_real_interval",
            ReviewField::LastReviewed => "last_reviewed",
            ReviewField::IntroducedOn => "introduced_on",
            ReviewField::ReviewDate => "review_date",
            ReviewField::Grade => "grade",
            ReviewField::Reviews => "reviews",
            ReviewField::Lapses => "lapses",
            ReviewField::Crammed => "crammed",
            ReviewField::Comment => "comment",
        }
    }

    /// Looks a field up by its snake_case name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Count(u32),
    Factor(f64),
    Days(i64),
    Date(NaiveDate),
    Grade(u8),
    Flag(bool),
    Text(Option<String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Count(value) => write!(f, "{}", value),
            FieldValue::Factor(value) => write!(f, "{:.2}", value),
            FieldValue::Days(value) => write!(f, "{}", value),
            FieldValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            FieldValue::Grade(value) => write!(f, "{}", value),
            FieldValue::Flag(value) => write!(f, "{}", value),
            FieldValue::Text(Some(value)) => write!(f, "{}", value),
            FieldValue::Text(None) => Ok(()),
        }
    }
}
