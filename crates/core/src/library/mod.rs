//! Media library: the registry of uploaded assets.
//!
//! Conversion records refer to attachments by ID; the library maps that ID
//! back to a source path and media type.

mod sqlite;

pub use sqlite::SqliteMediaLibrary;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::converter::MediaType;

/// A registered media asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub path: PathBuf,
    pub media_type: MediaType,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Attachment not found: {0}")]
    NotFound(i64),

    #[error("Unsupported media file: {0}")]
    UnsupportedMedia(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for LibraryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Storage for attachments.
pub trait MediaLibrary: Send + Sync {
    /// Registers a source file. Registering a known path returns the existing row.
    fn register(&self, path: &Path) -> Result<Attachment, LibraryError>;

    fn get(&self, id: i64) -> Result<Attachment, LibraryError>;

    fn find_by_path(&self, path: &Path) -> Result<Option<Attachment>, LibraryError>;

    /// Attachments ordered by ID, optionally restricted to one media type.
    fn list(&self, media_type: Option<MediaType>) -> Result<Vec<Attachment>, LibraryError>;
}

/// MIME type of a source file, from its extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "wmv" => "video/x-ms-wmv",
        "mpeg" | "mpg" => "video/mpeg",
        "flv" => "video/x-flv",
        _ => "application/octet-stream",
    }
}

/// Walks a directory and registers every convertible source file.
///
/// Files this system wrote (`.webp`, `.avif`, `.webm`, `.av1.mp4`) and hidden
/// entries are skipped. Returns the attachments in path order.
pub fn scan_directory(
    library: &dyn MediaLibrary,
    root: &Path,
) -> Result<Vec<Attachment>, LibraryError> {
    if !root.is_dir() {
        return Err(LibraryError::Io(format!(
            "Not a directory: {}",
            root.display()
        )));
    }

    let mut attachments = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || MediaType::from_path(entry.path()).is_none() {
            continue;
        }
        attachments.push(library.register(entry.path())?);
    }

    tracing::info!(
        root = %root.display(),
        count = attachments.len(),
        "Scanned media directory"
    );
    Ok(attachments)
}
