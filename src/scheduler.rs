//! Grading engine, cram channel and read-only projections over a review store.
//!
//! Every operation takes the acting learner explicitly. Operations on one
//! (learner, card) pair are serialized so that read-modify-write cycles on a
//! record never interleave; different pairs never wait on each other.

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::models::distribution::{self, Distribution, ProjectedReview};
use crate::models::legacy::{self, LegacyRecord};
use crate::models::sm2;
use crate::models::{CardId, Grade, LearnerId, RecordKey, ReviewRecord};
use crate::store::{Clock, ReviewStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-key mutexes, dropped again once nobody holds or waits for them.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<RecordKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn with_key<T>(&self, key: RecordKey, operation: impl FnOnce() -> Result<T>) -> Result<T> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(key).or_default())
        };

        let result = {
            // the guarded unit carries no data, a poisoned lock is still usable
            let _guard = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            operation()
        };

        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // one reference in the map, one here: nobody else is waiting
        if Arc::strong_count(&entry) == 2 {
            locks.remove(&key);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

/// Result of [`Scheduler::clear_cram`]. Records are cleared independently,
/// a failure on one card leaves the others cleared.
#[derive(Debug, Default)]
pub struct ClearCramOutcome {
    pub cleared: Vec<CardId>,
    pub failed: Vec<(CardId, SchedulerError)>,
}

pub struct Scheduler<S, C> {
    store: S,
    clock: C,
    config: SchedulerConfig,
    locks: KeyLocks,
}

impl<S: ReviewStore, C: Clock> Scheduler<S, C> {
    pub fn new(store: S, clock: C, config: SchedulerConfig) -> Self {
        Self {
            store,
            clock,
            config,
            locks: KeyLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn require(&self, key: RecordKey) -> Result<ReviewRecord> {
        self.store.get(key)?.ok_or(SchedulerError::NotMemorized(key))
    }

    /// First exposure of a card. `grade` defaults to the configured default (4).
    pub fn memorize(
        &self,
        learner: LearnerId,
        card: CardId,
        grade: Option<i64>,
    ) -> Result<ReviewRecord> {
        let grade = match grade {
            Some(value) => Grade::new(value)?,
            None => self.config.default_grade,
        };
        let key = RecordKey::new(learner, card);

        self.locks.with_key(key, || {
            if self.store.get(key)?.is_some() {
                return Err(SchedulerError::AlreadyMemorized(key));
            }
            let record = sm2::first_exposure(grade, self.clock.today());
            self.store.put(key, &record)?;
            log::info!(
                "learner {} memorized card {} with grade {}, due {}",
                learner, card, grade, record.review_date
            );
            Ok(record)
        })
    }

    /// Grades a memorized card.
    ///
    /// Reviewing ahead of `review_date` is rejected unless the card is crammed.
    /// A date before the last review is rejected even for crammed cards.
    pub fn review(&self, learner: LearnerId, card: CardId, grade: i64) -> Result<ReviewRecord> {
        let grade = Grade::new(grade)?;
        let key = RecordKey::new(learner, card);

        self.locks.with_key(key, || {
            let record = self.require(key)?;
            let today = self.clock.today();
            if today < record.last_reviewed {
                log::warn!(
                    "learner {} reviewed card {} on {}, before its last review {}",
                    learner, card, today, record.last_reviewed
                );
                return Err(SchedulerError::ReviewBeforeDue {
                    due: record.last_reviewed,
                });
            }
            if !record.crammed && today < record.review_date {
                log::debug!(
                    "learner {} reviewed card {} before its due date {}",
                    learner, card, record.review_date
                );
                return Err(SchedulerError::ReviewBeforeDue {
                    due: record.review_date,
                });
            }

            let updated = sm2::calculate_next_review(&record, grade, today, &self.config);
            self.store.put(key, &updated)?;
            if updated.lapses > record.lapses {
                log::info!("learner {} lapsed on card {} (grade {})", learner, card, grade);
            }
            log::info!(
                "learner {} reviewed card {} with grade {}: interval {} days, next review {}",
                learner, card, grade, updated.computed_interval, updated.review_date
            );
            Ok(updated)
        })
    }

    /// Deletes the review record. Re-memorizing afterwards starts from scratch.
    pub fn forget(&self, learner: LearnerId, card: CardId) -> Result<()> {
        let key = RecordKey::new(learner, card);
        self.locks.with_key(key, || {
            if !self.store.delete(key)? {
                return Err(SchedulerError::NotMemorized(key));
            }
            log::info!("learner {} forgot card {}", learner, card);
            Ok(())
        })
    }

    fn set_crammed(&self, key: RecordKey, crammed: bool) -> Result<ReviewRecord> {
        let mut record = self.require(key)?;
        if record.crammed != crammed {
            record.crammed = crammed;
            self.store.put(key, &record)?;
        }
        Ok(record)
    }

    pub fn add_to_cram(&self, learner: LearnerId, card: CardId) -> Result<ReviewRecord> {
        let key = RecordKey::new(learner, card);
        let record = self.locks.with_key(key, || self.set_crammed(key, true))?;
        log::info!("learner {} added card {} to cram", learner, card);
        Ok(record)
    }

    pub fn remove_from_cram(&self, learner: LearnerId, card: CardId) -> Result<ReviewRecord> {
        let key = RecordKey::new(learner, card);
        let record = self.locks.with_key(key, || self.set_crammed(key, false))?;
        log::info!("learner {} removed card {} from cram", learner, card);
        Ok(record)
    }

    /// Takes every card of the learner out of the cram channel.
    pub fn clear_cram(&self, learner: LearnerId) -> Result<ClearCramOutcome> {
        let crammed: Vec<CardId> = self
            .store
            .list_for_learner(learner)?
            .into_iter()
            .filter(|(_, record)| record.crammed)
            .map(|(card, _)| card)
            .collect();

        let mut outcome = ClearCramOutcome::default();
        for card in crammed {
            let key = RecordKey::new(learner, card);
            match self.locks.with_key(key, || self.set_crammed(key, false)) {
                Ok(_) => outcome.cleared.push(card),
                // forgotten since the listing: nothing left to clear
                Err(SchedulerError::NotMemorized(_)) => {}
                Err(err) => {
                    log::warn!(
                        "failed to clear cram for learner {} card {}: {}",
                        learner, card, err
                    );
                    outcome.failed.push((card, err));
                }
            }
        }
        log::info!(
            "cleared cram for learner {}: {} cards, {} failures",
            learner,
            outcome.cleared.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    fn sorted_records(
        &self,
        learner: LearnerId,
        keep: impl Fn(&ReviewRecord) -> bool,
    ) -> Result<Vec<(CardId, ReviewRecord)>> {
        let mut records: Vec<_> = self
            .store
            .list_for_learner(learner)?
            .into_iter()
            .filter(|(_, record)| keep(record))
            .collect();
        records.sort_by(|(a_card, a), (b_card, b)| {
            a.introduced_on.cmp(&b.introduced_on).then(a_card.cmp(b_card))
        });
        Ok(records)
    }

    /// Crammed cards, oldest introduction first.
    pub fn cram_queue(&self, learner: LearnerId) -> Result<Vec<(CardId, ReviewRecord)>> {
        self.sorted_records(learner, |record| record.crammed)
    }

    /// Cards due today or earlier, oldest introduction first.
    pub fn outstanding(&self, learner: LearnerId) -> Result<Vec<(CardId, ReviewRecord)>> {
        let today = self.clock.today();
        self.sorted_records(learner, |record| record.is_due(today))
    }

    /// Every memorized card, oldest introduction first.
    pub fn memorized(&self, learner: LearnerId) -> Result<Vec<(CardId, ReviewRecord)>> {
        self.sorted_records(learner, |_| true)
    }

    pub fn get_record(&self, learner: LearnerId, card: CardId) -> Result<ReviewRecord> {
        self.require(RecordKey::new(learner, card))
    }

    pub fn set_comment(
        &self,
        learner: LearnerId,
        card: CardId,
        comment: Option<String>,
    ) -> Result<ReviewRecord> {
        let key = RecordKey::new(learner, card);
        self.locks.with_key(key, || {
            let mut record = self.require(key)?;
            record.comment = comment;
            self.store.put(key, &record)?;
            Ok(record)
        })
    }

    /// Forecasts per-day due counts for the next `days_range` days
    /// (configured default when `None`). Nothing is written.
    pub fn project_distribution(
        &self,
        learner: LearnerId,
        days_range: Option<i64>,
    ) -> Result<Distribution> {
        let days_range = days_range.unwrap_or(self.config.default_days_range);
        distribution::validate_days_range(days_range, &self.config)?;

        let snapshot: Vec<ReviewRecord> = self
            .store
            .list_for_learner(learner)?
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        log::debug!(
            "projecting {} records of learner {} over {} days",
            snapshot.len(),
            learner,
            days_range
        );
        distribution::project_distribution(&snapshot, self.clock.today(), days_range, &self.config)
    }

    /// Previews the outcome of reviewing the card today with each grade.
    pub fn simulate_reviews(
        &self,
        learner: LearnerId,
        card: CardId,
    ) -> Result<Vec<ProjectedReview>> {
        let record = self.require(RecordKey::new(learner, card))?;
        Ok(distribution::simulate_reviews(&record, self.clock.today(), &self.config))
    }

    /// Stores a converted legacy record. Existing records are never overwritten.
    pub fn import_legacy(
        &self,
        learner: LearnerId,
        card: CardId,
        legacy_record: &LegacyRecord,
        start: i64,
    ) -> Result<ReviewRecord> {
        let record = legacy::convert_legacy_record(legacy_record, start)?;
        let key = RecordKey::new(learner, card);

        self.locks.with_key(key, || {
            if self.store.get(key)?.is_some() {
                return Err(SchedulerError::AlreadyMemorized(key));
            }
            self.store.put(key, &record)?;
            log::debug!("imported legacy record for learner {} card {}", learner, card);
            Ok(record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;
    use crate::store::FixedClock;
    use chrono::NaiveDate;
    use std::thread;

    const LEARNER: LearnerId = LearnerId(1);
    const CARD: CardId = CardId(100);

    fn start_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn scheduler() -> Scheduler<InMemoryStore, FixedClock> {
        Scheduler::new(
            InMemoryStore::new(),
            FixedClock::new(start_date()),
            SchedulerConfig::default(),
        )
    }

    #[test]
    fn test_memorize_defaults() {
        let scheduler = scheduler();
        let record = scheduler.memorize(LEARNER, CARD, None).unwrap();

        assert_eq!(record.grade, 4);
        assert_eq!(record.repetitions, 1);
        assert_eq!(record.easiness_factor, 2.5);
        assert_eq!(record.computed_interval, 1);
        assert_eq!(record.review_date, start_date() + chrono::Duration::days(1));
        assert_eq!(scheduler.get_record(LEARNER, CARD).unwrap(), record);
    }

    #[test]
    fn test_memorize_rejects_invalid_grade() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.memorize(LEARNER, CARD, Some(6)),
            Err(SchedulerError::InvalidGrade(6))
        ));
        assert!(scheduler.store().is_empty());
    }

    #[test]
    fn test_already_memorized() {
        let scheduler = scheduler();
        scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();
        assert!(matches!(
            scheduler.memorize(LEARNER, CARD, Some(5)),
            Err(SchedulerError::AlreadyMemorized(key)) if key == RecordKey::new(LEARNER, CARD)
        ));
        assert_eq!(scheduler.get_record(LEARNER, CARD).unwrap().grade, 4);
    }

    #[test]
    fn test_review_before_due() {
        let scheduler = scheduler();
        let memorized = scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();

        let result = scheduler.review(LEARNER, CARD, 5);
        assert!(matches!(
            result,
            Err(SchedulerError::ReviewBeforeDue { due }) if due == memorized.review_date
        ));
        assert_eq!(scheduler.get_record(LEARNER, CARD).unwrap(), memorized);
    }

    #[test]
    fn test_review_not_memorized() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.review(LEARNER, CARD, 4),
            Err(SchedulerError::NotMemorized(_))
        ));
    }

    #[test]
    fn test_review_invalid_grade_checked_first() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.review(LEARNER, CARD, -3),
            Err(SchedulerError::InvalidGrade(-3))
        ));
    }

    #[test]
    fn test_second_review_after_a_week() {
        let scheduler = scheduler();
        scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();
        scheduler.clock().advance_days(7);

        let record = scheduler.review(LEARNER, CARD, 3).unwrap();
        let today = start_date() + chrono::Duration::days(7);
        assert!((record.easiness_factor - 2.36).abs() < 1e-9);
        assert_eq!(record.repetitions, 2);
        assert_eq!(record.computed_interval, 6);
        assert_eq!(record.current_real_interval, 7);
        assert_eq!(record.last_reviewed, today);
        assert_eq!(record.review_date, today + chrono::Duration::days(6));
        assert_eq!(record.introduced_on, start_date());
        assert_eq!(record.reviews, 2);
    }

    #[test]
    fn test_review_sequence_keeps_invariants() {
        let scheduler = scheduler();
        let mut record = scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();

        for grade in [3, 4, 5, 1, 5, 2, 3, 4, 5] {
            scheduler.clock().set(record.review_date + chrono::Duration::days(10));
            record = scheduler.review(LEARNER, CARD, grade).unwrap();

            assert!(record.easiness_factor >= sm2::MIN_EASINESS_FACTOR);
            assert!(record.repetitions >= 1);
            assert_eq!(
                record.review_date,
                record.last_reviewed + chrono::Duration::days(record.computed_interval)
            );
            assert!(record.introduced_on <= record.last_reviewed);
        }
        assert_eq!(record.reviews, 10);
        assert_eq!(record.lapses, 2);
    }

    #[test]
    fn test_cram_allows_early_review() {
        let scheduler = scheduler();
        scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();
        scheduler.add_to_cram(LEARNER, CARD).unwrap();

        let record = scheduler.review(LEARNER, CARD, 5).unwrap();
        assert!(record.crammed);
        assert_eq!(record.repetitions, 2);
        assert_eq!(record.computed_interval, 6);
        assert_eq!(record.current_real_interval, 0);
    }

    #[test]
    fn test_crammed_review_rejects_date_before_last_review() {
        let memorized_on = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let scheduler = scheduler();
        scheduler.clock().set(memorized_on);
        let memorized = scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();
        scheduler.add_to_cram(LEARNER, CARD).unwrap();

        scheduler.clock().set(NaiveDate::from_ymd_opt(2024, 6, 5).unwrap());
        assert!(matches!(
            scheduler.review(LEARNER, CARD, 4),
            Err(SchedulerError::ReviewBeforeDue { due }) if due == memorized_on
        ));

        let stored = scheduler.get_record(LEARNER, CARD).unwrap();
        assert_eq!(stored.reviews, memorized.reviews);
        assert_eq!(stored.last_reviewed, memorized_on);
        assert!(stored.crammed);
    }

    #[test]
    fn test_cram_toggles_are_idempotent() {
        let scheduler = scheduler();
        let memorized = scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();

        scheduler.add_to_cram(LEARNER, CARD).unwrap();
        let record = scheduler.add_to_cram(LEARNER, CARD).unwrap();
        assert!(record.crammed);
        assert_eq!(record.review_date, memorized.review_date);
        assert_eq!(record.computed_interval, memorized.computed_interval);
        assert_eq!(record.reviews, memorized.reviews);

        scheduler.remove_from_cram(LEARNER, CARD).unwrap();
        let record = scheduler.remove_from_cram(LEARNER, CARD).unwrap();
        assert!(!record.crammed);
    }

    #[test]
    fn test_cram_requires_record() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.add_to_cram(LEARNER, CARD),
            Err(SchedulerError::NotMemorized(_))
        ));
        assert!(matches!(
            scheduler.remove_from_cram(LEARNER, CARD),
            Err(SchedulerError::NotMemorized(_))
        ));
    }

    #[test]
    fn test_clear_cram_only_touches_learner() {
        let scheduler = scheduler();
        let other = LearnerId(2);
        for card in [CardId(1), CardId(2), CardId(3)] {
            scheduler.memorize(LEARNER, card, None).unwrap();
            scheduler.add_to_cram(LEARNER, card).unwrap();
        }
        scheduler.memorize(other, CardId(1), None).unwrap();
        scheduler.add_to_cram(other, CardId(1)).unwrap();

        let outcome = scheduler.clear_cram(LEARNER).unwrap();
        assert_eq!(outcome.cleared, vec![CardId(1), CardId(2), CardId(3)]);
        assert!(outcome.failed.is_empty());
        assert!(scheduler.cram_queue(LEARNER).unwrap().is_empty());
        assert_eq!(scheduler.cram_queue(other).unwrap().len(), 1);
    }

    #[test]
    fn test_forget_then_memorize_starts_fresh() {
        let scheduler = scheduler();
        scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();
        scheduler.clock().advance_days(1);
        scheduler.review(LEARNER, CARD, 0).unwrap();
        assert_eq!(scheduler.get_record(LEARNER, CARD).unwrap().lapses, 1);

        scheduler.forget(LEARNER, CARD).unwrap();
        assert!(matches!(
            scheduler.forget(LEARNER, CARD),
            Err(SchedulerError::NotMemorized(_))
        ));

        let record = scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();
        assert_eq!(record.repetitions, 1);
        assert_eq!(record.lapses, 0);
        assert_eq!(record.reviews, 1);
        assert_eq!(record.introduced_on, start_date() + chrono::Duration::days(1));
    }

    #[test]
    fn test_outstanding_and_memorized_ordering() {
        let scheduler = scheduler();
        scheduler.memorize(LEARNER, CardId(7), None).unwrap();
        scheduler.clock().advance_days(1);
        scheduler.memorize(LEARNER, CardId(3), None).unwrap();

        let memorized: Vec<_> = scheduler
            .memorized(LEARNER)
            .unwrap()
            .into_iter()
            .map(|(card, _)| card)
            .collect();
        assert_eq!(memorized, vec![CardId(7), CardId(3)]);

        let outstanding = scheduler.outstanding(LEARNER).unwrap();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].0, CardId(7));
    }

    #[test]
    fn test_set_comment() {
        let scheduler = scheduler();
        scheduler.memorize(LEARNER, CARD, None).unwrap();
        let record = scheduler
            .set_comment(LEARNER, CARD, Some("false friend".to_string()))
            .unwrap();
        assert_eq!(record.comment.as_deref(), Some("false friend"));
        assert_eq!(
            scheduler.get_record(LEARNER, CARD).unwrap().comment.as_deref(),
            Some("false friend")
        );
    }

    #[test]
    fn test_project_distribution() {
        let scheduler = scheduler();
        scheduler.memorize(LEARNER, CardId(1), None).unwrap();
        scheduler.memorize(LEARNER, CardId(2), None).unwrap();
        scheduler.memorize(LearnerId(9), CardId(1), None).unwrap();

        let distribution = scheduler.project_distribution(LEARNER, None).unwrap();
        assert_eq!(distribution.days_range(), 3);
        assert_eq!(distribution.count_on(0), 0);
        assert_eq!(distribution.count_on(1), 2);
        assert_eq!(distribution.total(), 2);

        // read-only
        assert_eq!(scheduler.get_record(LEARNER, CardId(1)).unwrap().reviews, 1);
    }

    #[test]
    fn test_project_distribution_range_errors() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.project_distribution(LEARNER, Some(-1)),
            Err(SchedulerError::InvalidRange(-1))
        ));
        assert!(matches!(
            scheduler.project_distribution(LEARNER, Some(31)),
            Err(SchedulerError::RangeExceeded { ceiling: 30 })
        ));
    }

    #[test]
    fn test_simulate_reviews() {
        let scheduler = scheduler();
        scheduler.memorize(LEARNER, CARD, None).unwrap();

        let projected = scheduler.simulate_reviews(LEARNER, CARD).unwrap();
        assert_eq!(projected.len(), 6);
        assert_eq!(projected[5].record.computed_interval, 6);
        assert_eq!(scheduler.get_record(LEARNER, CARD).unwrap().repetitions, 1);
    }

    #[test]
    fn test_import_legacy() {
        let scheduler = scheduler();
        let legacy_record = LegacyRecord {
            item_id: 1236435838,
            scheduled_repeat_days: 6574,
            real_last_interval_days: 673,
            current_interval_days: 1397,
            repeat_count: 6,
            grade: 4,
        };

        let record = scheduler.import_legacy(LEARNER, CARD, &legacy_record, 1186655166).unwrap();
        assert_eq!(record.easiness_factor, 2.08);
        assert_eq!(scheduler.get_record(LEARNER, CARD).unwrap(), record);

        assert!(matches!(
            scheduler.import_legacy(LEARNER, CARD, &legacy_record, 1186655166),
            Err(SchedulerError::AlreadyMemorized(_))
        ));

        let broken = LegacyRecord {
            real_last_interval_days: 0,
            ..legacy_record
        };
        assert!(matches!(
            scheduler.import_legacy(LEARNER, CardId(5), &broken, 1186655166),
            Err(SchedulerError::MalformedLegacyRecord(_))
        ));
    }

    #[test]
    fn test_concurrent_reviews_are_serialized() {
        let scheduler = Arc::new(scheduler());
        scheduler.memorize(LEARNER, CARD, Some(4)).unwrap();
        scheduler.add_to_cram(LEARNER, CARD).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || {
                    for _ in 0..5 {
                        scheduler.review(LEARNER, CARD, 4).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let record = scheduler.get_record(LEARNER, CARD).unwrap();
        assert_eq!(record.reviews, 41);
        assert_eq!(record.repetitions, 41);
        assert_eq!(scheduler.locks.len(), 0);
    }
}
