pub mod distribution;
pub mod grade;
pub mod legacy;
pub mod review_record;
pub mod sm2;

pub use distribution::{DayCount, Distribution, ProjectedReview};
pub use grade::Grade;
pub use legacy::LegacyRecord;
pub use review_record::{CardId, FieldValue, LearnerId, RecordKey, ReviewField, ReviewRecord};
