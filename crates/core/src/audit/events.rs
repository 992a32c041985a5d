use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::converter::Format;

/// Severity of an activity entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Info,
    Warning,
    Error,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("Unknown level: {}", other)),
        }
    }
}

/// Activity log event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    // System events
    ServiceStarted {
        version: String,
        /// Short SHA-256 of the loaded configuration
        config_hash: String,
        image_processor: String,
        video_processor: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Conversions
    ConversionCompleted {
        attachment_id: i64,
        format: Format,
        converted_path: String,
        /// Percent
        size_reduction: f64,
        /// Seconds
        processing_time: u64,
    },
    ConversionFailed {
        attachment_id: i64,
        format: Format,
        error: String,
    },
    BulkConversionQueued {
        attachments: u32,
        batch_size: u32,
    },
    BulkConversionFinished {
        processed: u32,
        converted: u32,
        failed: u32,
        skipped: u32,
        cancelled: bool,
    },

    // Administration
    OptionsUpdated {
        /// Names of the option fields that changed
        changed: Vec<String>,
    },
    RecordsCleaned {
        retention_days: u32,
        deleted: u64,
    },
    RecordsPurged {
        records: u64,
        files_deleted: u64,
    },
    TempFilesCleaned {
        deleted: u64,
        bytes_freed: u64,
    },
    FileDeleted {
        attachment_id: i64,
        format: Format,
        path: String,
    },
}

impl ActivityEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::ConversionCompleted { .. } => "conversion_completed",
            Self::ConversionFailed { .. } => "conversion_failed",
            Self::BulkConversionQueued { .. } => "bulk_conversion_queued",
            Self::BulkConversionFinished { .. } => "bulk_conversion_finished",
            Self::OptionsUpdated { .. } => "options_updated",
            Self::RecordsCleaned { .. } => "records_cleaned",
            Self::RecordsPurged { .. } => "records_purged",
            Self::TempFilesCleaned { .. } => "temp_files_cleaned",
            Self::FileDeleted { .. } => "file_deleted",
        }
    }

    pub fn level(&self) -> ActivityLevel {
        match self {
            Self::ConversionFailed { .. } => ActivityLevel::Error,
            Self::RecordsPurged { .. } => ActivityLevel::Warning,
            Self::BulkConversionFinished {
                failed, cancelled, ..
            } if *failed > 0 || *cancelled => ActivityLevel::Warning,
            _ => ActivityLevel::Info,
        }
    }

    pub fn attachment_id(&self) -> Option<i64> {
        match self {
            Self::ConversionCompleted { attachment_id, .. }
            | Self::ConversionFailed { attachment_id, .. }
            | Self::FileDeleted { attachment_id, .. } => Some(*attachment_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub level: ActivityLevel,
    pub attachment_id: Option<i64>,
    pub data: ActivityEvent,
}
