//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

use super::types::{Format, MediaType};

/// Errors that can occur during conversion.
///
/// These never cross the service boundary as faults: services turn them into
/// `false` returns or `ConversionResult::errors` entries.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// No usable backend was found for the media type.
    #[error("No {media_type} processor available")]
    NoProcessorAvailable { media_type: MediaType },

    /// The format is not a target of this service or not supported by its backend.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: Format },

    /// Input file not found.
    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// The backend ran but produced no valid output.
    #[error("Conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Encode exceeded its time bound.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

impl ConversionError {
    /// Creates a new conversion failed error with stderr output.
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Stable machine-readable name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoProcessorAvailable { .. } => "no_processor_available",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::SourceNotFound { .. } => "source_not_found",
            Self::ConversionFailed { .. } => "conversion_failed",
            Self::Timeout { .. } => "timeout",
        }
    }
}
