//! JSON import/export module for review records.
//! Exports a learner's records to a JSON file and reads legacy scheduler dumps.

use crate::error::SchedulerError;
use crate::models::{CardId, LegacyRecord, ReviewRecord};
use crate::scheduler::Scheduler;
use crate::store::{Clock, ReviewStore};
use crate::LearnerId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};

/// Export-only view; records enter the store only through the scheduler.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportedRecord {
    pub card: CardId,
    #[serde(flatten)]
    pub record: ReviewRecord,
}

/// Legacy scheduler export: its start time plus the raw attributes of every item.
///
/// ```json
/// {
///   "time_of_start": 1186655166,
///   "items": [
///     {"card": 1, "id": 1236435838, "stmtrpt": 6574, "rllivl": 1764,
///      "ivl": 583, "rp": 6, "gr": 4}
///   ]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyDump {
    pub time_of_start: i64,
    pub items: Vec<LegacyItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyItem {
    pub card: CardId,
    #[serde(flatten)]
    pub record: LegacyRecord,
}

#[derive(Debug, Default)]
pub struct LegacyImportReport {
    pub imported: Vec<CardId>,
    pub rejected: Vec<(CardId, SchedulerError)>,
}

impl LegacyDump {
    /// Imports every item for `learner`. A rejected item does not stop the others.
    pub fn import_into<S: ReviewStore, C: Clock>(
        &self,
        scheduler: &Scheduler<S, C>,
        learner: LearnerId,
    ) -> LegacyImportReport {
        let mut report = LegacyImportReport::default();
        for item in &self.items {
            match scheduler.import_legacy(learner, item.card, &item.record, self.time_of_start) {
                Ok(_) => report.imported.push(item.card),
                Err(err) => {
                    log::warn!("skipping legacy item for card {}: {}", item.card, err);
                    report.rejected.push((item.card, err));
                }
            }
        }
        report
    }
}

/// Exports records to a JSON file at the specified path.
/// Returns an error if file creation or writing fails.
pub fn export_records_to_path(
    records: &[(CardId, ReviewRecord)],
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let exported: Vec<ExportedRecord> = records
        .iter()
        .map(|(card, record)| ExportedRecord {
            card: *card,
            record: record.clone(),
        })
        .collect();
    let json_string = serde_json::to_string_pretty(&exported)?;
    let mut file = File::create(path)?;
    file.write_all(json_string.as_bytes())?;
    log::info!("exported {} records to '{}'", exported.len(), path);
    Ok(())
}

/// Reads a legacy dump from a JSON file.
/// Returns an error if the file doesn't exist or contains invalid JSON.
pub fn import_legacy_json(filename: &str) -> Result<LegacyDump, Box<dyn std::error::Error>> {
    let mut file = File::open(filename)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let dump: LegacyDump = serde_json::from_str(&contents)?;

    log::info!("read {} legacy items from '{}'", dump.items.len(), filename);
    Ok(dump)
}
