use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{ConversionRecord, Statistics, StatsFilter};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<rusqlite::Error> for TrackerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Persistence for conversion records.
pub trait ConversionStore: Send + Sync {
    /// Insert a record, returns the assigned ID. `record.id` is ignored.
    fn insert(&self, record: &ConversionRecord) -> Result<i64, TrackerError>;

    /// Matching records, newest first.
    fn query(&self, filter: &StatsFilter, limit: i64)
        -> Result<Vec<ConversionRecord>, TrackerError>;

    fn count(&self, filter: &StatsFilter) -> Result<i64, TrackerError>;

    fn statistics(&self, filter: &StatsFilter) -> Result<Statistics, TrackerError>;

    /// Delete records created strictly before `cutoff`.
    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize, TrackerError>;

    fn delete_all(&self) -> Result<usize, TrackerError>;
}
