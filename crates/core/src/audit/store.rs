use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{ActivityLevel, ActivityRecord};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for AuditError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Filter for querying the activity log
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub event_type: Option<String>,
    pub level: Option<ActivityLevel>,
    pub attachment_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_level(mut self, level: ActivityLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_attachment(mut self, attachment_id: i64) -> Self {
        self.attachment_id = Some(attachment_id);
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for activity log storage
pub trait AuditStore: Send + Sync {
    /// Insert a record, returns the assigned ID
    fn insert(&self, record: &ActivityRecord) -> Result<i64, AuditError>;

    /// Matching records, newest first, paginated by `limit`/`offset`
    fn query(&self, filter: &AuditFilter) -> Result<Vec<ActivityRecord>, AuditError>;

    /// Count matching records, ignoring pagination
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}
