use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use super::{ActivityEvent, ActivityRecord, AuditError, AuditFilter, AuditStore};
use crate::db;

/// SQLite-backed activity log
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open the store, creating the database file and table if needed
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::with_connection(db::open(path)?)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self, AuditError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                level TEXT NOT NULL,
                attachment_id INTEGER,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activity_log_timestamp ON activity_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_activity_log_event_type ON activity_log(event_type);
            CREATE INDEX IF NOT EXISTS idx_activity_log_level ON activity_log(level);
            CREATE INDEX IF NOT EXISTS idx_activity_log_attachment ON activity_log(attachment_id);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref event_type) = filter.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.clone()));
        }

        if let Some(level) = filter.level {
            conditions.push("level = ?");
            params.push(Box::new(level.as_str()));
        }

        if let Some(attachment_id) = filter.attachment_id {
            conditions.push("attachment_id = ?");
            params.push(Box::new(attachment_id));
        }

        if let Some(ref from) = filter.from {
            conditions.push("timestamp >= ?");
            params.push(Box::new(db::timestamp(from)));
        }

        if let Some(ref to) = filter.to {
            conditions.push("timestamp <= ?");
            params.push(Box::new(db::timestamp(to)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &ActivityRecord) -> Result<i64, AuditError> {
        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO activity_log (timestamp, event_type, level, attachment_id, data) VALUES (?, ?, ?, ?, ?)",
            params![
                db::timestamp(&record.timestamp),
                record.event_type,
                record.level.as_str(),
                record.attachment_id,
                data_json,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<ActivityRecord>, AuditError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, timestamp, event_type, level, attachment_id, data FROM activity_log {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn.prepare(&sql)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_type: String = row.get(2)?;
            let level: String = row.get(3)?;
            let attachment_id: Option<i64> = row.get(4)?;
            let data_json: String = row.get(5)?;

            Ok((id, timestamp_str, event_type, level, attachment_id, data_json))
        })?;

        let mut records = Vec::new();
        for row_result in rows {
            let (id, timestamp_str, event_type, level, attachment_id, data_json) = row_result?;

            let timestamp = db::parse_timestamp(&timestamp_str).map_err(AuditError::Database)?;
            let level = level.parse().map_err(AuditError::Database)?;
            let data: ActivityEvent = serde_json::from_str(&data_json)
                .map_err(|e| AuditError::Serialization(e.to_string()))?;

            records.push(ActivityRecord {
                id,
                timestamp,
                event_type,
                level,
                attachment_id,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM activity_log {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ActivityLevel;
    use crate::converter::Format;
    use chrono::{Duration, Utc};

    fn create_test_store() -> SqliteAuditStore {
        SqliteAuditStore::in_memory().unwrap()
    }

    fn record(event: ActivityEvent) -> ActivityRecord {
        ActivityRecord {
            id: 0,
            timestamp: Utc::now(),
            event_type: event.event_type().to_string(),
            level: event.level(),
            attachment_id: event.attachment_id(),
            data: event,
        }
    }

    fn started() -> ActivityRecord {
        record(ActivityEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
            image_processor: "native".to_string(),
            video_processor: "none".to_string(),
        })
    }

    fn completed(attachment_id: i64) -> ActivityRecord {
        record(ActivityEvent::ConversionCompleted {
            attachment_id,
            format: Format::Webp,
            converted_path: format!("/uploads/{}.webp", attachment_id),
            size_reduction: 40.0,
            processing_time: 1,
        })
    }

    fn failed(attachment_id: i64) -> ActivityRecord {
        record(ActivityEvent::ConversionFailed {
            attachment_id,
            format: Format::Avif,
            error: "boom".to_string(),
        })
    }

    #[test]
    fn test_insert_and_query() {
        let store = create_test_store();

        let id = store.insert(&started()).unwrap();
        assert!(id > 0);

        let results = store.query(&AuditFilter::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].event_type, "service_started");
        assert_eq!(results[0].level, ActivityLevel::Info);
    }

    #[test]
    fn test_query_filters() {
        let store = create_test_store();
        store.insert(&started()).unwrap();
        store.insert(&completed(1)).unwrap();
        store.insert(&completed(2)).unwrap();
        store.insert(&failed(2)).unwrap();

        let by_type = AuditFilter::new().with_event_type("conversion_completed");
        assert_eq!(store.query(&by_type).unwrap().len(), 2);

        let by_level = AuditFilter::new().with_level(ActivityLevel::Error);
        let errors = store.query(&by_level).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event_type, "conversion_failed");

        let by_attachment = AuditFilter::new().with_attachment(2);
        assert_eq!(store.query(&by_attachment).unwrap().len(), 2);
        assert_eq!(store.count(&by_attachment).unwrap(), 2);
    }

    #[test]
    fn test_query_with_time_range() {
        let store = create_test_store();

        let now = Utc::now();
        let mut old = started();
        old.timestamp = now - Duration::hours(2);
        store.insert(&old).unwrap();
        store.insert(&started()).unwrap();

        let filter = AuditFilter::new().with_time_range(Some(now - Duration::hours(1)), None);
        assert_eq!(store.query(&filter).unwrap().len(), 1);
    }

    #[test]
    fn test_newest_first_and_pagination() {
        let store = create_test_store();
        for i in 0..5 {
            store.insert(&completed(i)).unwrap();
        }

        let first_page = store
            .query(&AuditFilter::new().with_limit(2).with_offset(0))
            .unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].attachment_id, Some(4));

        let last_page = store
            .query(&AuditFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(last_page.len(), 1);
        assert_eq!(last_page[0].attachment_id, Some(0));

        assert_eq!(store.count(&AuditFilter::new().with_limit(1)).unwrap(), 5);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("data/flux.db");

        let store = SqliteAuditStore::new(&db_path).unwrap();
        store.insert(&started()).unwrap();
        assert!(db_path.exists());

        let reopened = SqliteAuditStore::new(&db_path).unwrap();
        assert_eq!(reopened.query(&AuditFilter::new()).unwrap().len(), 1);
    }
}
