pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod models;
pub mod scheduler;
pub mod store;

pub use config::SchedulerConfig;
pub use error::{ConfigError, SchedulerError, StoreError};
pub use models::legacy::convert_legacy_record;
pub use models::{CardId, Distribution, Grade, LearnerId, LegacyRecord, RecordKey, ReviewRecord};
pub use scheduler::{ClearCramOutcome, Scheduler};
pub use store::{Clock, ReviewStore, VisibilityScope};
