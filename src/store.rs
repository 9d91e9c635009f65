//! Collaborators the scheduler depends on: a record store, a clock and the
//! category-visibility predicate used by callers to pre-filter cards.

use crate::error::StoreError;
use crate::models::{CardId, LearnerId, RecordKey, ReviewRecord};
use chrono::{Local, NaiveDate};
use std::collections::HashSet;
use std::sync::Mutex;

/// Storage for review records, one per (learner, card).
///
/// Implementations must be safe to share between threads. The scheduler
/// serializes access per key, so `put` may overwrite unconditionally.
pub trait ReviewStore: Send + Sync {
    fn get(&self, key: RecordKey) -> Result<Option<ReviewRecord>, StoreError>;

    /// All records owned by `learner`, ordered by card id.
    fn list_for_learner(&self, learner: LearnerId)
    -> Result<Vec<(CardId, ReviewRecord)>, StoreError>;

    /// Inserts or replaces the record under `key`.
    fn put(&self, key: RecordKey, record: &ReviewRecord) -> Result<(), StoreError>;

    /// Removes the record. Returns `false` when nothing was stored.
    fn delete(&self, key: RecordKey) -> Result<bool, StoreError>;
}

/// Source of the current date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date of the machine.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a settable date.
#[derive(Debug)]
pub struct FixedClock {
    date: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        let mut current = self.date.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = date;
    }

    pub fn advance_days(&self, days: i64) {
        let mut current = self.date.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = crate::models::sm2::add_days(*current, days);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.date.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}

/// Whether a card lies within a learner's selected categories.
///
/// The scheduler never consults this; callers use it to decide which cards
/// reach the scheduler at all.
pub trait VisibilityScope {
    fn is_visible(&self, learner: LearnerId, card: CardId) -> bool;
}

/// Scope of a learner with no category selection: everything is visible.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllVisible;

impl VisibilityScope for AllVisible {
    fn is_visible(&self, _learner: LearnerId, _card: CardId) -> bool {
        true
    }
}

/// Scope made of an explicit set of cards, resolved from category trees elsewhere.
#[derive(Clone, Debug, Default)]
pub struct CardScope {
    cards: HashSet<CardId>,
}

impl CardScope {
    pub fn new(cards: impl IntoIterator<Item = CardId>) -> Self {
        Self {
            cards: cards.into_iter().collect(),
        }
    }
}

impl VisibilityScope for CardScope {
    fn is_visible(&self, _learner: LearnerId, card: CardId) -> bool {
        self.cards.contains(&card)
    }
}

/// Keeps only the records whose card is visible to `learner`.
pub fn visible_only<V: VisibilityScope + ?Sized>(
    scope: &V,
    learner: LearnerId,
    records: Vec<(CardId, ReviewRecord)>,
) -> Vec<(CardId, ReviewRecord)> {
    records
        .into_iter()
        .filter(|(card, _)| scope.is_visible(learner, *card))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Grade;
    use crate::models::sm2::first_exposure;

    #[test]
    fn test_fixed_clock() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.today(), start);

        clock.advance_days(2);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        clock.set(start);
        assert_eq!((&clock).today(), start);
    }

    #[test]
    fn test_visible_only() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let record = first_exposure(Grade::DEFAULT, today);
        let records = vec![
            (CardId(1), record.clone()),
            (CardId(2), record.clone()),
            (CardId(3), record),
        ];
        let learner = LearnerId(1);

        let scope = CardScope::new([CardId(1), CardId(3)]);
        let scoped = visible_only(&scope, learner, records.clone());
        let cards: Vec<_> = scoped.iter().map(|(card, _)| *card).collect();
        assert_eq!(cards, vec![CardId(1), CardId(3)]);

        assert_eq!(visible_only(&AllVisible, learner, records).len(), 3);
    }
}
