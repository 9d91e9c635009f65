//! In-process review record store.

use crate::error::StoreError;
use crate::models::{CardId, LearnerId, RecordKey, ReviewRecord};
use crate::store::ReviewStore;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<BTreeMap<RecordKey, ReviewRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReviewStore for InMemoryStore {
    fn get(&self, key: RecordKey) -> Result<Option<ReviewRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(&key).cloned())
    }

    fn list_for_learner(
        &self,
        learner: LearnerId,
    ) -> Result<Vec<(CardId, ReviewRecord)>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        // keys sort by learner first, then card
        let first = RecordKey::new(learner, CardId(i64::MIN));
        let last = RecordKey::new(learner, CardId(i64::MAX));
        Ok(records
            .range(first..=last)
            .map(|(key, record)| (key.card, record.clone()))
            .collect())
    }

    fn put(&self, key: RecordKey, record: &ReviewRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.insert(key, record.clone());
        Ok(())
    }

    fn delete(&self, key: RecordKey) -> Result<bool, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.remove(&key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Grade;
    use crate::models::sm2::first_exposure;
    use chrono::NaiveDate;

    #[test]
    fn test_put_get_delete() {
        let store = InMemoryStore::new();
        let key = RecordKey::new(LearnerId(1), CardId(10));
        let record = first_exposure(Grade::DEFAULT, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        assert_eq!(store.get(key).unwrap(), None);
        store.put(key, &record).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(record));

        assert!(store.delete(key).unwrap());
        assert!(!store.delete(key).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_for_learner_is_scoped() {
        let store = InMemoryStore::new();
        let record = first_exposure(Grade::DEFAULT, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        store.put(RecordKey::new(LearnerId(1), CardId(3)), &record).unwrap();
        store.put(RecordKey::new(LearnerId(1), CardId(-2)), &record).unwrap();
        store.put(RecordKey::new(LearnerId(2), CardId(1)), &record).unwrap();

        let cards: Vec<_> = store
            .list_for_learner(LearnerId(1))
            .unwrap()
            .into_iter()
            .map(|(card, _)| card)
            .collect();
        assert_eq!(cards, vec![CardId(-2), CardId(3)]);
        assert_eq!(store.len(), 3);
    }
}
