use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::converter::{ConversionResult, MediaType};

/// Settings the pipeline takes from the config file.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root scanned by bulk runs.
    pub uploads_dir: PathBuf,
    /// Where in-progress encodes are staged.
    pub temp_dir: PathBuf,
    /// Bulk worker count.
    pub max_parallel_conversions: usize,
    /// Staged files older than this are removed by temp cleanup.
    pub temp_file_max_age: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            uploads_dir: config.media.uploads_dir.clone(),
            temp_dir: config.converter.temp_dir.clone(),
            max_parallel_conversions: config.converter.max_parallel_conversions.max(1),
            temp_file_max_age: Duration::from_secs(config.converter.temp_file_max_age_secs),
        }
    }
}

/// Outcome of converting one attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    pub attachment_id: i64,
    pub media_type: MediaType,
    pub source: PathBuf,
    /// Seconds spent on the whole job.
    pub processing_time: u64,
    #[serde(flatten)]
    pub result: ConversionResult,
}

/// Progress of the current or last bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub queued: u32,
    pub processed: u32,
    pub converted: u32,
    pub failed: u32,
    /// Already converted attachments left out of the batch.
    pub skipped: u32,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkStatus {
    pub running: bool,
    pub cancel_requested: bool,
    pub last: Option<BulkSummary>,
}

/// Result of deleting every converted file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearSummary {
    pub files_deleted: u64,
    pub records_deleted: u64,
}

/// Result of a temp directory sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempCleanup {
    pub deleted: u64,
    pub bytes_freed: u64,
}
