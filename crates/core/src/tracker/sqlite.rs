use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{
    ConversionRecord, ConversionStatus, ConversionStore, Statistics, StatsFilter, TrackerError,
};
use crate::converter::Format;
use crate::db;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS conversions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        attachment_id INTEGER NOT NULL,
        original_path TEXT NOT NULL,
        converted_path TEXT NOT NULL DEFAULT '',
        format TEXT NOT NULL,
        status TEXT NOT NULL,
        size_reduction REAL NOT NULL DEFAULT 0,
        processing_time INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        bytes_saved INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conversions_attachment ON conversions(attachment_id);
    CREATE INDEX IF NOT EXISTS idx_conversions_format ON conversions(format);
    CREATE INDEX IF NOT EXISTS idx_conversions_status ON conversions(status);
    CREATE INDEX IF NOT EXISTS idx_conversions_created_at ON conversions(created_at);
"#;

const COLUMNS: &str = "id, attachment_id, original_path, converted_path, format, status, \
     size_reduction, processing_time, error_message, bytes_saved, created_at";

/// SQLite-backed conversion store
pub struct SqliteConversionStore {
    conn: Mutex<Connection>,
}

impl SqliteConversionStore {
    /// Open the store, creating the database file and table if needed
    pub fn new(path: &Path) -> Result<Self, TrackerError> {
        Self::with_connection(db::open(path)?)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self, TrackerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, TrackerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TrackerError> {
        self.conn
            .lock()
            .map_err(|_| TrackerError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &StatsFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(format) = filter.format {
            conditions.push("format = ?");
            params.push(Box::new(format.as_str()));
        }

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref from) = filter.date_from {
            conditions.push("created_at >= ?");
            params.push(Box::new(db::timestamp(from)));
        }

        if let Some(ref to) = filter.date_to {
            conditions.push("created_at <= ?");
            params.push(Box::new(db::timestamp(to)));
        }

        if let Some(attachment_id) = filter.attachment_id {
            conditions.push("attachment_id = ?");
            params.push(Box::new(attachment_id));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            id: row.get(0)?,
            attachment_id: row.get(1)?,
            original_path: row.get(2)?,
            converted_path: row.get(3)?,
            format: row.get(4)?,
            status: row.get(5)?,
            size_reduction: row.get(6)?,
            processing_time: row.get(7)?,
            error_message: row.get(8)?,
            bytes_saved: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

/// Row as stored, before enum and timestamp parsing.
struct RawRecord {
    id: i64,
    attachment_id: i64,
    original_path: String,
    converted_path: String,
    format: String,
    status: String,
    size_reduction: f64,
    processing_time: i64,
    error_message: Option<String>,
    bytes_saved: i64,
    created_at: String,
}

impl TryFrom<RawRecord> for ConversionRecord {
    type Error = TrackerError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        Ok(ConversionRecord {
            id: raw.id,
            attachment_id: raw.attachment_id,
            original_path: raw.original_path,
            converted_path: raw.converted_path,
            format: raw.format.parse().map_err(TrackerError::InvalidRecord)?,
            status: raw.status.parse().map_err(TrackerError::InvalidRecord)?,
            size_reduction: raw.size_reduction,
            processing_time: raw.processing_time,
            error_message: raw.error_message,
            bytes_saved: raw.bytes_saved,
            created_at: db::parse_timestamp(&raw.created_at).map_err(TrackerError::InvalidRecord)?,
        })
    }
}

impl ConversionStore for SqliteConversionStore {
    fn insert(&self, record: &ConversionRecord) -> Result<i64, TrackerError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO conversions (attachment_id, original_path, converted_path, format, status, \
             size_reduction, processing_time, error_message, bytes_saved, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.attachment_id,
                record.original_path,
                record.converted_path,
                record.format.as_str(),
                record.status.as_str(),
                record.size_reduction,
                record.processing_time,
                record.error_message,
                record.bytes_saved,
                db::timestamp(&record.created_at),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn query(
        &self,
        filter: &StatsFilter,
        limit: i64,
    ) -> Result<Vec<ConversionRecord>, TrackerError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM conversions {} ORDER BY created_at DESC, id DESC LIMIT ?",
            COLUMNS, where_clause
        );

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(limit));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(ConversionRecord::try_from(row?)?);
        }
        Ok(records)
    }

    fn count(&self, filter: &StatsFilter) -> Result<i64, TrackerError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM conversions {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn statistics(&self, filter: &StatsFilter) -> Result<Statistics, TrackerError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let sql = format!(
            "SELECT COUNT(*), \
             COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0), \
             COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0), \
             COALESCE(AVG(CASE WHEN status = 'success' THEN size_reduction END), 0.0), \
             COALESCE(SUM(bytes_saved), 0) \
             FROM conversions {}",
            where_clause
        );
        let (total, successful, failed, average, saved): (i64, i64, i64, f64, i64) = conn
            .query_row(&sql, param_refs.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?;

        let mut stats = Statistics {
            total_conversions: total as u64,
            successful_conversions: successful as u64,
            failed_conversions: failed as u64,
            average_size_reduction: average,
            total_space_saved: saved,
            ..Default::default()
        };
        stats.compute_success_rate();

        let sql = format!(
            "SELECT format, COUNT(*) FROM conversions {} GROUP BY format",
            where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (format, count) = row?;
            let format: Format = format.parse().map_err(TrackerError::InvalidRecord)?;
            stats.conversions_by_format.insert(format, count as u64);
        }

        Ok(stats)
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize, TrackerError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM conversions WHERE created_at < ?",
            params![db::timestamp(&cutoff)],
        )?)
    }

    fn delete_all(&self) -> Result<usize, TrackerError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM conversions", [])?)
    }
}
