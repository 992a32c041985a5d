//! SQLite-backed media library.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{mime_type_for, Attachment, LibraryError, MediaLibrary};
use crate::converter::MediaType;
use crate::db;

pub struct SqliteMediaLibrary {
    conn: Mutex<Connection>,
}

impl SqliteMediaLibrary {
    pub fn new(path: &Path) -> Result<Self, LibraryError> {
        Self::with_connection(db::open(path)?)
    }

    pub fn in_memory() -> Result<Self, LibraryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LibraryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                media_type TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_attachments_media_type ON attachments(media_type);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LibraryError> {
        self.conn
            .lock()
            .map_err(|_| LibraryError::Database("connection lock poisoned".to_string()))
    }

    fn attachment_from_row(
        row: &Row<'_>,
    ) -> rusqlite::Result<(i64, String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn parse(raw: (i64, String, String, String, String)) -> Result<Attachment, LibraryError> {
        let (id, path, media_type, mime_type, created_at) = raw;
        let media_type = match media_type.as_str() {
            "image" => MediaType::Image,
            "video" => MediaType::Video,
            other => {
                return Err(LibraryError::Database(format!(
                    "Unknown media type: {}",
                    other
                )))
            }
        };
        Ok(Attachment {
            id,
            path: PathBuf::from(path),
            media_type,
            mime_type,
            created_at: db::parse_timestamp(&created_at).map_err(LibraryError::Database)?,
        })
    }
}

impl MediaLibrary for SqliteMediaLibrary {
    fn register(&self, path: &Path) -> Result<Attachment, LibraryError> {
        let media_type = MediaType::from_path(path)
            .ok_or_else(|| LibraryError::UnsupportedMedia(path.display().to_string()))?;
        let path_str = path.to_string_lossy().to_string();

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO attachments (path, media_type, mime_type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                path_str,
                media_type.as_str(),
                mime_type_for(path),
                db::timestamp(&Utc::now()),
            ],
        )?;

        let raw = conn.query_row(
            "SELECT id, path, media_type, mime_type, created_at FROM attachments WHERE path = ?1",
            params![path_str],
            Self::attachment_from_row,
        )?;
        let attachment = Self::parse(raw)?;

        if inserted > 0 {
            tracing::debug!(
                id = attachment.id,
                path = %path.display(),
                media_type = %media_type,
                "Registered attachment"
            );
        }
        Ok(attachment)
    }

    fn get(&self, id: i64) -> Result<Attachment, LibraryError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, path, media_type, mime_type, created_at FROM attachments WHERE id = ?1",
                params![id],
                Self::attachment_from_row,
            )
            .optional()?
            .ok_or(LibraryError::NotFound(id))?;
        Self::parse(raw)
    }

    fn find_by_path(&self, path: &Path) -> Result<Option<Attachment>, LibraryError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, path, media_type, mime_type, created_at FROM attachments WHERE path = ?1",
                params![path.to_string_lossy().to_string()],
                Self::attachment_from_row,
            )
            .optional()?;
        raw.map(Self::parse).transpose()
    }

    fn list(&self, media_type: Option<MediaType>) -> Result<Vec<Attachment>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, path, media_type, mime_type, created_at FROM attachments
             WHERE ?1 IS NULL OR media_type = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(
                params![media_type.map(|m| m.as_str())],
                Self::attachment_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::parse).collect()
    }
}
