//! Conversion pipeline: attachments in, tracked conversions out.
//!
//! The pipeline resolves an attachment to its source file, hands it to the
//! converter service for its media type, records every format outcome in the
//! tracker and emits activity events. Bulk runs fan out over a bounded
//! worker pool.

mod maintenance;
mod runner;
mod types;

pub use runner::ConversionPipeline;
pub use types::*;

use thiserror::Error;

use crate::converter::{Format, MediaType};
use crate::library::LibraryError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(i64),

    #[error("No enabled formats for {media_type} attachment {attachment_id}")]
    NoFormats {
        attachment_id: i64,
        media_type: MediaType,
    },

    #[error("Attachment {attachment_id} has no converted {format} file")]
    NotConverted { attachment_id: i64, format: Format },

    #[error("A bulk conversion is already running")]
    BulkInProgress,

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Library error: {0}")]
    Library(LibraryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LibraryError> for PipelineError {
    fn from(e: LibraryError) -> Self {
        match e {
            LibraryError::NotFound(id) => Self::AttachmentNotFound(id),
            other => Self::Library(other),
        }
    }
}
