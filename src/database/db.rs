//! SQLite persistence for review records
//!
//! Handles database initialization, CRUD operations on per-learner review
//! records and the simulated current date kept in `app_state`.

use crate::error::StoreError;
use crate::models::{CardId, LearnerId, RecordKey, ReviewRecord};
use crate::models::sm2::add_days;
use crate::store::ReviewStore;
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_COLUMNS: &str = "card_id, repetitions, easiness_factor, computed_interval,
    current_real_interval, last_reviewed, introduced_on, review_date, grade, reviews,
    lapses, crammed, comment";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Row as read from `review_records`, dates still in text form
struct StoredRow {
    card_id: i64,
    repetitions: u32,
    easiness_factor: f64,
    computed_interval: i64,
    current_real_interval: i64,
    last_reviewed: String,
    introduced_on: String,
    review_date: String,
    grade: u8,
    reviews: u32,
    lapses: u32,
    crammed: bool,
    comment: Option<String>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            card_id: row.get(0)?,
            repetitions: row.get(1)?,
            easiness_factor: row.get(2)?,
            computed_interval: row.get(3)?,
            current_real_interval: row.get(4)?,
            last_reviewed: row.get(5)?,
            introduced_on: row.get(6)?,
            review_date: row.get(7)?,
            grade: row.get(8)?,
            reviews: row.get(9)?,
            lapses: row.get(10)?,
            crammed: row.get(11)?,
            comment: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<(CardId, ReviewRecord), StoreError> {
        let record = ReviewRecord {
            repetitions: self.repetitions,
            easiness_factor: self.easiness_factor,
            computed_interval: self.computed_interval,
            current_real_interval: self.current_real_interval,
            last_reviewed: parse_date(&self.last_reviewed)?,
            introduced_on: parse_date(&self.introduced_on)?,
            review_date: parse_date(&self.review_date)?,
            grade: self.grade,
            reviews: self.reviews,
            lapses: self.lapses,
            crammed: self.crammed,
            comment: self.comment,
        };
        Ok((CardId(self.card_id), record))
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| StoreError::InvalidDate(value.to_string()))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl SqliteStore {
    /// Opens (or creates) the database file and its tables
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        log::debug!("opened review database at {}", path.as_ref().display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Creates tables for review records and app state.
    /// Sets current date to today if not already initialized.
    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS review_records (
                learner_id INTEGER NOT NULL,
                card_id INTEGER NOT NULL,
                repetitions INTEGER NOT NULL DEFAULT 1,
                easiness_factor REAL NOT NULL DEFAULT 2.5,
                computed_interval INTEGER NOT NULL DEFAULT 1,
                current_real_interval INTEGER NOT NULL DEFAULT 0,
                last_reviewed TEXT NOT NULL,
                introduced_on TEXT NOT NULL,
                review_date TEXT NOT NULL,
                grade INTEGER NOT NULL DEFAULT 4,
                reviews INTEGER NOT NULL DEFAULT 1,
                lapses INTEGER NOT NULL DEFAULT 0,
                crammed INTEGER NOT NULL DEFAULT 0,
                comment TEXT,
                PRIMARY KEY (learner_id, card_id)
            )",
            (),
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            (),
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO app_state (key, value) VALUES ('current_date', ?1)",
            params![format_date(Local::now().date_naive())],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Retrieves the simulated current date
    pub fn get_current_date(&self) -> Result<NaiveDate, StoreError> {
        let conn = self.lock()?;
        let value: String = conn.query_row(
            "SELECT value FROM app_state WHERE key = 'current_date'",
            [],
            |row| row.get(0),
        )?;
        parse_date(&value)
    }

    pub fn set_current_date(&self, date: NaiveDate) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE app_state SET value = ?1 WHERE key = 'current_date'",
            params![format_date(date)],
        )?;
        Ok(())
    }

    /// Advances the simulated current date by one day
    pub fn advance_day(&self) -> Result<NaiveDate, StoreError> {
        let next_day = add_days(self.get_current_date()?, 1);
        self.set_current_date(next_day)?;
        Ok(next_day)
    }
}

impl ReviewStore for SqliteStore {
    fn get(&self, key: RecordKey) -> Result<Option<ReviewRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM review_records WHERE learner_id = ?1 AND card_id = ?2",
                    SELECT_COLUMNS
                ),
                params![key.learner.0, key.card.0],
                StoredRow::from_row,
            )
            .optional()?;

        row.map(|row| row.into_record().map(|(_, record)| record))
            .transpose()
    }

    fn list_for_learner(
        &self,
        learner: LearnerId,
    ) -> Result<Vec<(CardId, ReviewRecord)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM review_records WHERE learner_id = ?1 ORDER BY card_id ASC",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![learner.0], StoredRow::from_row)?
            .collect::<rusqlite::Result<Vec<StoredRow>>>()?;

        rows.into_iter().map(StoredRow::into_record).collect()
    }

    fn put(&self, key: RecordKey, record: &ReviewRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO review_records
             (learner_id, card_id, repetitions, easiness_factor, computed_interval,
              current_real_interval, last_reviewed, introduced_on, review_date, grade,
              reviews, lapses, crammed, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                key.learner.0,
                key.card.0,
                record.repetitions,
                record.easiness_factor,
                record.computed_interval,
                record.current_real_interval,
                format_date(record.last_reviewed),
                format_date(record.introduced_on),
                format_date(record.review_date),
                record.grade,
                record.reviews,
                record.lapses,
                record.crammed,
                record.comment,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, key: RecordKey) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM review_records WHERE learner_id = ?1 AND card_id = ?2",
            params![key.learner.0, key.card.0],
        )?;
        Ok(removed > 0)
    }
}
